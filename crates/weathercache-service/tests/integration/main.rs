mod read_through;
mod upstream_errors;
mod utils;
