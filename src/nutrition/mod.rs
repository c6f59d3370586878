pub mod advisor;
pub mod knowledge;
pub mod lookup;
pub mod nutrients;
pub mod prompt;
