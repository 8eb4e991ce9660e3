#[macro_use]
extern crate tracing;

pub mod animation;
pub mod backend;
pub mod cli;
pub mod compositor;
pub mod effect;
pub mod effects;
pub mod frame_clock;
pub mod input;
pub mod output;
pub mod paint;
pub mod render_helpers;
pub mod seat;
pub mod utils;
pub mod window;

#[cfg(test)]
mod tests;
