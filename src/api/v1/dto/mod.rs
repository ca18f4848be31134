pub mod open_finance;
