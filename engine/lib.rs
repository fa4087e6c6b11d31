#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod clinical;
pub mod pipeline;
pub mod summary;

#[path = "../features/mod.rs"]
pub mod features;

#[path = "../model/mod.rs"]
pub mod model;
