// ============================================================
// CSV INFRASTRUCTURE LAYER
// ============================================================
// Reading the exported report, with encoding and delimiter detection

mod csv_parser;

pub use csv_parser::CsvParser;
