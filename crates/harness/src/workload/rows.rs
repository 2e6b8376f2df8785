//! Generated row data shared by every insert strategy

/// Character repeated to build the `value` column
const FILL: char = 'X';

/// Rows with ids `0..len` and a constant fixed-width text value
#[derive(Debug, Clone)]
pub struct RowSet {
    ids: Vec<i64>,
    values: Vec<String>,
}

impl RowSet {
    /// Generate `row_count` rows whose values are `value_width` fill characters
    pub fn generate(row_count: u64, value_width: usize) -> Self {
        let value: String = std::iter::repeat(FILL).take(value_width).collect();
        let ids: Vec<i64> = (0..row_count as i64).collect();
        let values = vec![value; ids.len()];
        Self { ids, values }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The `id` column
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// The `value` column
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Rows as `(id, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> + '_ {
        self.ids
            .iter()
            .copied()
            .zip(self.values.iter().map(String::as_str))
    }

    /// Consecutive row ranges of at most `size` rows
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = (&[i64], &[String])> + '_ {
        let size = size.max(1);
        self.ids.chunks(size).zip(self.values.chunks(size))
    }
}

/// Append one row in COPY text format (tab separated, newline terminated)
pub fn encode_copy_row(id: i64, value: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(id.to_string().as_bytes());
    out.push(b'\t');
    for byte in value.bytes() {
        match byte {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            other => out.push(other),
        }
    }
    out.push(b'\n');
}
