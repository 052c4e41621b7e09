pub mod flaky_backend;
