use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ast::CastType;
use crate::tac::{Instruction, Op, Operand, TacProgram};

use super::builtins;
use super::error::{RuntimeError, RuntimeErrorKind};
use super::input::{self, DEFAULT_PROMPT};
use super::value::Value;

/// Deepest user-function nesting before a call fails.
pub const MAX_CALL_DEPTH: usize = 1000;

type ExecResult<T> = std::result::Result<T, RuntimeErrorKind>;

/// One active user-function call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub function: String,
    pub locals: FxHashMap<String, Value>,
    pub temps: FxHashMap<u32, Value>,
    /// Instruction to continue with after the call returns.
    pub return_ip: usize,
    /// Caller temporary receiving the return value.
    pub dest: u32,
}

/// A `get()` waiting for its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInput {
    pub dest: u32,
    pub prompt: String,
    pub cast: Option<CastType>,
}

/// Everything needed to continue a run later: the machine holds no other state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ip: usize,
    pub globals: FxHashMap<String, Value>,
    /// Temporaries of top-level code.
    pub temps: FxHashMap<u32, Value>,
    pub frames: Vec<Frame>,
    /// Arguments pushed by `PARAM` and not yet consumed by `CALL`.
    pub params: Vec<Value>,
    pub output: Vec<String>,
    pub steps: usize,
    pub pending_input: Option<PendingInput>,
}

/// Why a run stopped without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Suspended { prompt: String },
    Finished,
}

enum Flow {
    Continue,
    Suspend(String),
}

impl Snapshot {
    /// Executes from the current instruction until the program ends, asks for input, or fails.
    pub fn run(&mut self, program: &TacProgram, max_steps: usize) -> Result<Outcome, RuntimeError> {
        while let Some(instruction) = program.instructions.get(self.ip) {
            if self.steps >= max_steps {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::StepLimit { max: max_steps },
                    instruction.span,
                ));
            }
            self.steps += 1;
            self.ip += 1;
            match self
                .execute(program, instruction)
                .map_err(|kind| RuntimeError::new(kind, instruction.span))?
            {
                Flow::Continue => {}
                Flow::Suspend(prompt) => return Ok(Outcome::Suspended { prompt }),
            }
        }
        Ok(Outcome::Finished)
    }

    /// Binds the answer to a pending `get()`.
    pub fn provide_input(&mut self, raw: &str) -> ExecResult<()> {
        let pending = self
            .pending_input
            .take()
            .ok_or(RuntimeErrorKind::NotWaiting)?;
        let value = input::coerce(raw, pending.cast)?;
        self.temps_mut().insert(pending.dest, value);
        Ok(())
    }

    fn execute(&mut self, program: &TacProgram, instruction: &Instruction) -> ExecResult<Flow> {
        let op = instruction.op;
        match op {
            Op::Label | Op::FunctionBegin => {}
            Op::Assign => {
                let value = self.read(program, op, &instruction.arg1)?;
                self.write(program, op, &instruction.result, value)?;
            }
            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Mod
            | Op::And
            | Op::Or
            | Op::Eq
            | Op::Neq
            | Op::Lt
            | Op::Le
            | Op::Gt
            | Op::Ge => {
                let left = self.read(program, op, &instruction.arg1)?;
                let right = self.read(program, op, &instruction.arg2)?;
                let value = binary(op, &left, &right)?;
                self.write(program, op, &instruction.result, value)?;
            }
            Op::Neg => {
                let value = self.read(program, op, &instruction.arg1)?.negate()?;
                self.write(program, op, &instruction.result, value)?;
            }
            Op::Not => {
                let value = self.read(program, op, &instruction.arg1)?;
                self.write(program, op, &instruction.result, Value::State(!value.is_truthy()))?;
            }
            Op::Goto => self.jump(program, op, &instruction.arg1)?,
            Op::IfFalse | Op::IfTrue => {
                let condition = self.read(program, op, &instruction.arg1)?.is_truthy();
                if condition == (op == Op::IfTrue) {
                    self.jump(program, op, &instruction.arg2)?;
                }
            }
            Op::Print => {
                let value = self.read(program, op, &instruction.arg1)?;
                self.output.push(value.to_string());
            }
            Op::Input => {
                let prompt = match &instruction.arg1 {
                    Some(_) => self.read(program, op, &instruction.arg1)?.to_string(),
                    None => DEFAULT_PROMPT.to_string(),
                };
                let dest = temp_id(op, &instruction.result)?;
                let cast = program.instructions.get(self.ip).and_then(|next| {
                    match (&next.op, &next.arg1, &next.arg2) {
                        (Op::Typecast, Some(Operand::Temp(id)), Some(Operand::Type(target)))
                            if *id == dest =>
                        {
                            Some(*target)
                        }
                        _ => None,
                    }
                });
                self.pending_input = Some(PendingInput {
                    dest,
                    prompt: prompt.clone(),
                    cast,
                });
                return Ok(Flow::Suspend(prompt));
            }
            Op::Typecast => {
                let value = self.read(program, op, &instruction.arg1)?;
                let Some(Operand::Type(target)) = &instruction.arg2 else {
                    return Err(malformed(op));
                };
                let value = value.cast(*target)?;
                self.write(program, op, &instruction.result, value)?;
            }
            Op::Param => {
                let value = self.read(program, op, &instruction.arg1)?;
                self.params.push(value);
            }
            Op::Call => self.call(program, instruction)?,
            Op::Return | Op::FunctionEnd => {
                let value = match op {
                    Op::Return => self.read(program, op, &instruction.arg1)?,
                    _ => Value::Empty,
                };
                let frame = self
                    .frames
                    .pop()
                    .ok_or(RuntimeErrorKind::ReturnOutsideFunction)?;
                self.ip = frame.return_ip;
                self.temps_mut().insert(frame.dest, value);
            }
            Op::ListCreate => {
                self.write(program, op, &instruction.result, Value::List(Vec::new()))?;
            }
            Op::ListAppend => {
                let mut list = self.read(program, op, &instruction.arg1)?;
                let value = self.read(program, op, &instruction.arg2)?;
                value.check_element()?;
                match &mut list {
                    Value::List(items) => items.push(value),
                    other => {
                        return Err(RuntimeErrorKind::NotIndexable {
                            found: other.type_name(),
                        });
                    }
                }
                self.write(program, op, &instruction.arg1, list)?;
            }
            Op::ListAccess => {
                let target = self.read(program, op, &instruction.arg1)?;
                let index = self.read(program, op, &instruction.arg2)?;
                let value = element(&target, &index)?;
                self.write(program, op, &instruction.result, value)?;
            }
            Op::ListSet => {
                let index = self.read(program, op, &instruction.arg1)?;
                let value = self.read(program, op, &instruction.arg2)?;
                value.check_element()?;
                let mut target = self.read(program, op, &instruction.result)?;
                match &mut target {
                    Value::List(items) => {
                        let position = list_position(&index, items.len())?;
                        items[position] = value;
                    }
                    other => {
                        return Err(RuntimeErrorKind::NotIndexable {
                            found: other.type_name(),
                        });
                    }
                }
                self.write(program, op, &instruction.result, target)?;
            }
            Op::GroupCreate => {
                self.write(program, op, &instruction.result, Value::Group(Vec::new()))?;
            }
            Op::GroupAccess => {
                let target = self.read(program, op, &instruction.arg1)?;
                let key = self.read(program, op, &instruction.arg2)?;
                let value = member(&target, &key)?;
                self.write(program, op, &instruction.result, value)?;
            }
            Op::GroupSet => {
                let key = checked_key(self.read(program, op, &instruction.arg1)?)?;
                let value = self.read(program, op, &instruction.arg2)?;
                value.check_element()?;
                let mut target = self.read(program, op, &instruction.result)?;
                match &mut target {
                    Value::Group(members) => {
                        match members.iter_mut().find(|(existing, _)| existing.equals(&key)) {
                            Some((_, slot)) => *slot = value,
                            None => members.push((key, value)),
                        }
                    }
                    other => {
                        return Err(RuntimeErrorKind::NotAGroup {
                            found: other.type_name(),
                        });
                    }
                }
                self.write(program, op, &instruction.result, target)?;
            }
        }
        Ok(Flow::Continue)
    }

    fn call(&mut self, program: &TacProgram, instruction: &Instruction) -> ExecResult<()> {
        let op = instruction.op;
        let Some(Operand::Count(argc)) = &instruction.arg2 else {
            return Err(malformed(op));
        };
        let split = self
            .params
            .len()
            .checked_sub(*argc)
            .ok_or_else(|| malformed(op))?;
        let args = self.params.split_off(split);

        match &instruction.arg1 {
            Some(Operand::Builtin(function)) => {
                let value = builtins::call(*function, args)?;
                self.write(program, op, &instruction.result, value)
            }
            Some(Operand::Function(name)) => {
                let info = program
                    .functions
                    .get(name)
                    .ok_or_else(|| RuntimeErrorKind::UndefinedFunction { name: name.clone() })?;
                if info.params.len() != args.len() {
                    return Err(RuntimeErrorKind::ArityMismatch {
                        name: name.clone(),
                        expected: info.params.len().to_string(),
                        found: args.len(),
                    });
                }
                if self.frames.len() >= MAX_CALL_DEPTH {
                    return Err(RuntimeErrorKind::CallDepth {
                        depth: MAX_CALL_DEPTH,
                    });
                }
                let dest = temp_id(op, &instruction.result)?;
                self.frames.push(Frame {
                    function: name.clone(),
                    locals: info.params.iter().cloned().zip(args).collect(),
                    temps: FxHashMap::default(),
                    return_ip: self.ip,
                    dest,
                });
                self.ip = info.entry;
                Ok(())
            }
            _ => Err(malformed(op)),
        }
    }

    fn jump(&mut self, program: &TacProgram, op: Op, target: &Option<Operand>) -> ExecResult<()> {
        let Some(Operand::Label(label)) = target else {
            return Err(malformed(op));
        };
        self.ip = program
            .label(label)
            .ok_or_else(|| RuntimeErrorKind::UnknownLabel {
                label: label.clone(),
            })?;
        Ok(())
    }

    fn temps(&self) -> &FxHashMap<u32, Value> {
        match self.frames.last() {
            Some(frame) => &frame.temps,
            None => &self.temps,
        }
    }

    fn temps_mut(&mut self) -> &mut FxHashMap<u32, Value> {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.temps,
            None => &mut self.temps,
        }
    }

    /// Whether `name` lives in the innermost frame rather than in the globals.
    fn is_local(&self, program: &TacProgram, name: &str) -> bool {
        self.frames.last().is_some_and(|frame| {
            program
                .functions
                .get(&frame.function)
                .is_some_and(|info| info.locals.contains(name))
        })
    }

    fn read(&self, program: &TacProgram, op: Op, operand: &Option<Operand>) -> ExecResult<Value> {
        match operand {
            Some(Operand::Temp(id)) => Ok(self.temps().get(id).cloned().unwrap_or(Value::Empty)),
            Some(Operand::Var(name)) => {
                let value = if self.is_local(program, name) {
                    self.frames.last().and_then(|frame| frame.locals.get(name))
                } else {
                    self.globals.get(name)
                };
                value
                    .cloned()
                    .ok_or_else(|| RuntimeErrorKind::UndefinedVariable {
                        name: source_name(name).to_string(),
                    })
            }
            Some(Operand::Integer(value)) => Ok(Value::Integer(*value)),
            Some(Operand::Point(value)) => Ok(Value::Point(*value)),
            Some(Operand::Text(value)) => Ok(Value::Text(value.clone())),
            Some(Operand::State(value)) => Ok(Value::State(*value)),
            Some(Operand::Empty) => Ok(Value::Empty),
            _ => Err(malformed(op)),
        }
    }

    fn write(
        &mut self,
        program: &TacProgram,
        op: Op,
        operand: &Option<Operand>,
        value: Value,
    ) -> ExecResult<()> {
        match operand {
            Some(Operand::Temp(id)) => {
                self.temps_mut().insert(*id, value);
            }
            Some(Operand::Var(name)) => {
                if self.is_local(program, name)
                    && let Some(frame) = self.frames.last_mut()
                {
                    frame.locals.insert(name.clone(), value);
                } else {
                    self.globals.insert(name.clone(), value);
                }
            }
            _ => return Err(malformed(op)),
        }
        Ok(())
    }
}

fn malformed(op: Op) -> RuntimeErrorKind {
    RuntimeErrorKind::MalformedInstruction { op: op.name() }
}

fn temp_id(op: Op, operand: &Option<Operand>) -> ExecResult<u32> {
    match operand {
        Some(Operand::Temp(id)) => Ok(*id),
        _ => Err(malformed(op)),
    }
}

/// Drops the shadowing suffix added during lowering (`x.2` is `x` in the source).
fn source_name(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

fn binary(op: Op, left: &Value, right: &Value) -> ExecResult<Value> {
    let ordering = |operator: &'static str, accept: fn(std::cmp::Ordering) -> bool| {
        left.compare(right)
            .map(|ordering| Value::State(accept(ordering)))
            .ok_or(RuntimeErrorKind::OperandTypes {
                operator,
                left: left.type_name(),
                right: right.type_name(),
            })
    };
    match op {
        Op::Add => left.add(right),
        Op::Sub => left.sub(right),
        Op::Mul => left.mul(right),
        Op::Div => left.div(right),
        Op::Mod => left.rem(right),
        Op::And => Ok(Value::State(left.is_truthy() && right.is_truthy())),
        Op::Or => Ok(Value::State(left.is_truthy() || right.is_truthy())),
        Op::Eq => Ok(Value::State(left.equals(right))),
        Op::Neq => Ok(Value::State(!left.equals(right))),
        Op::Lt => ordering("<", |ordering| ordering.is_lt()),
        Op::Le => ordering("<=", |ordering| ordering.is_le()),
        Op::Gt => ordering(">", |ordering| ordering.is_gt()),
        Op::Ge => ordering(">=", |ordering| ordering.is_ge()),
        other => Err(malformed(other)),
    }
}

fn list_position(index: &Value, len: usize) -> ExecResult<usize> {
    let index = match index {
        Value::Integer(index) => *index,
        other => {
            return Err(RuntimeErrorKind::IndexType {
                found: other.type_name(),
            });
        }
    };
    usize::try_from(index)
        .ok()
        .filter(|position| *position < len)
        .ok_or(RuntimeErrorKind::IndexOutOfBounds { index, len })
}

fn element(target: &Value, index: &Value) -> ExecResult<Value> {
    match target {
        Value::List(items) => Ok(items[list_position(index, items.len())?].clone()),
        Value::Text(text) => {
            let chars = text.chars().collect::<Vec<_>>();
            let position = list_position(index, chars.len())?;
            Ok(Value::Text(chars[position].to_string()))
        }
        other => Err(RuntimeErrorKind::NotIndexable {
            found: other.type_name(),
        }),
    }
}

fn checked_key(key: Value) -> ExecResult<Value> {
    match key {
        Value::Integer(_) | Value::Point(_) | Value::Text(_) | Value::State(_) => Ok(key),
        other => Err(RuntimeErrorKind::InvalidKey {
            found: other.type_name(),
        }),
    }
}

fn member(target: &Value, key: &Value) -> ExecResult<Value> {
    match target {
        Value::Group(members) => members
            .iter()
            .find(|(existing, _)| existing.equals(key))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| RuntimeErrorKind::MissingKey {
                key: match key {
                    Value::Text(text) => format!("\"{text}\""),
                    other => other.to_string(),
                },
            }),
        other => Err(RuntimeErrorKind::NotAGroup {
            found: other.type_name(),
        }),
    }
}
