// ============================================================
// CSV PARSER
// ============================================================
// Parse the exported report into a header row plus data rows

use std::path::Path;

use csv::ReaderBuilder;
use encoding_rs::WINDOWS_1252;

use crate::domain::error::AppError;
use crate::domain::report::ReportTable;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// CSV parser with encoding detection
pub struct CsvParser {
    /// Delimiter character (default: comma)
    delimiter: u8,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self {
            delimiter: b',',
        }
    }
}

impl CsvParser {
    /// Create a new CSV parser with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Parse CSV content from string. Cells keep their whitespace.
    pub fn parse_content(&self, content: &str) -> Result<ReportTable, AppError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true) // Allow rows with different lengths
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::ParseError(format!("Failed to read CSV headers: {}", e)))?
            .iter()
            .map(str::to_string)
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(AppError::ParseError("CSV has no header row".to_string()));
        }

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                AppError::ParseError(format!("Failed to parse CSV row {}: {}", index + 1, e))
            })?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(ReportTable::new(headers, rows))
    }

    /// Parse a CSV file with automatic delimiter detection
    pub fn parse_file_auto_detect(path: &Path) -> Result<ReportTable, AppError> {
        let content = Self::read_with_encoding_detection(path)?;
        let delimiter = Self::detect_delimiter(&content);

        Self::new().with_delimiter(delimiter).parse_content(&content)
    }

    /// Decode as UTF-8 (dropping a BOM), falling back to Windows-1252 which
    /// is what spreadsheet exports fall back to for accented names.
    fn read_with_encoding_detection(path: &Path) -> Result<String, AppError> {
        let buffer = std::fs::read(path).map_err(|e| {
            AppError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(Self::decode(&buffer))
    }

    fn decode(buffer: &[u8]) -> String {
        let bytes = buffer.strip_prefix(UTF8_BOM).unwrap_or(buffer);

        match std::str::from_utf8(bytes) {
            Ok(content) => content.to_string(),
            Err(_) => {
                let (content, _, _) = WINDOWS_1252.decode(bytes);
                content.into_owned()
            }
        }
    }

    /// Detect delimiter from content (comma, semicolon, tab, pipe)
    pub fn detect_delimiter(content: &str) -> u8 {
        let candidates = [b',', b';', b'\t', b'|'];

        let mut best_delimiter = b',';
        let mut best_score = 0.0f32;

        let sample_lines: Vec<_> = content.lines().take(10).collect();
        if sample_lines.is_empty() {
            return best_delimiter;
        }

        for &delimiter in &candidates {
            let field_counts: Vec<usize> = sample_lines
                .iter()
                .map(|line| line.bytes().filter(|&b| b == delimiter).count())
                .collect();

            // Score by consistency (low standard deviation) and frequency
            let avg = field_counts.iter().sum::<usize>() as f32 / field_counts.len() as f32;
            let variance = field_counts
                .iter()
                .map(|&x| (x as f32 - avg).powi(2))
                .sum::<f32>()
                / field_counts.len() as f32;

            let score = avg / (1.0 + variance.sqrt());

            if score > best_score {
                best_score = score;
                best_delimiter = delimiter;
            }
        }

        best_delimiter
    }
}
