pub mod proportion_test;
