// ncc — Neuron Compiler Collection
//
// Library root. Stages in pipeline order: ir → linearize → opt → regalloc /
// memalloc (listing) → encode.

pub mod asm;
pub mod diag;
pub mod encode;
pub mod ir;
pub mod lexer;
pub mod linearize;
pub mod listing;
pub mod memalloc;
pub mod models;
pub mod opt;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod regalloc;
