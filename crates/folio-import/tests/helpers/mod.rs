pub mod memory_remote;
