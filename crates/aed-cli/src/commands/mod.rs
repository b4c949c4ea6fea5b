pub mod self_test;
