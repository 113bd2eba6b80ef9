// Rowcast Infrastructure - Filesystem Adapters
// Implements: ProgressSink (CSV file output)

mod csv_file_sink;

pub use csv_file_sink::CsvFileSink;
