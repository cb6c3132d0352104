mod app;
mod dom;
mod frame;
mod net;
mod panel;
mod persistence;
mod render;
mod state;
mod util;

pub use app::run;
