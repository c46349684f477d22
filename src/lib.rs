pub mod ast;
pub mod builtins;
pub mod config;
pub mod diagnostic;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod semantic;
pub mod server;
pub mod service;
pub mod tac;
pub mod token;
