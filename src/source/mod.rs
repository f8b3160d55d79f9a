pub mod base;
pub mod youtube;

#[cfg(test)]
pub mod fake;
