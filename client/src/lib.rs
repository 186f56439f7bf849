pub mod bus;
pub mod canvas;
pub mod geometry;
pub mod notify;
pub mod replay;
pub mod screen;
pub mod state;
pub mod surface;
pub mod viewport;

mod app;
mod dom;
mod net;
mod palette;
mod render;
mod util;
mod ws;

#[cfg(test)]
mod testing;

pub use app::run;
