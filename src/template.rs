//! Main module for the template compiler

pub mod assembling;
pub mod compiler;
pub mod diagnostics;
pub mod expressions;
pub mod fragments;
pub mod keywords;
pub mod manager;
pub mod runtime;
pub mod scanning;
pub mod statements;
pub mod testing;
