mod analysis;
mod common;
mod decision;
mod registry;
