//! SpriteFE document core: observable property entities, layered and framed
//! palette-indexed images, undo history, drawing tools and project I/O.

pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod ops;
pub mod project;
pub mod props;
pub mod registry;
pub mod settings;
pub mod sprite;
