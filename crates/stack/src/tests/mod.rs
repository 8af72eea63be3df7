mod helpers;

mod reload_tests;
