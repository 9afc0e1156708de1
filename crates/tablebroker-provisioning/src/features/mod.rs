pub mod postgres_backend;
