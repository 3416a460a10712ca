pub mod csv;

pub use csv::{
    csv_filename,
    generate_csv,
    Priority,
};
