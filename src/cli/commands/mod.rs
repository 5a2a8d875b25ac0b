pub mod apply;
pub mod patterns;
pub mod timeline;
