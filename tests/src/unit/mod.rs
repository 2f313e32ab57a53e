mod export_tests;
mod state_tests;
mod store_tests;
