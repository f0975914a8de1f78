mod in_ci;

pub use in_ci::in_ci;
