pub mod options;

pub use options::OptionsDb;
