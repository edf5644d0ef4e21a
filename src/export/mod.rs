mod csv;

pub use csv::export_csv;
