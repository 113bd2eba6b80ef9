// Export Use Cases

pub mod create;
