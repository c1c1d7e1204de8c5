use super::format_u64_commas;

/// A noun the CLI prints next to counts.
#[derive(Debug, Clone, Copy)]
pub struct Noun {
    one: &'static str,
    many: &'static str,
}

pub const RECORD: Noun = Noun::new("record", "records");
pub const BATCH: Noun = Noun::new("batch", "batches");

impl Noun {
    pub const fn new(one: &'static str, many: &'static str) -> Self {
        Self { one, many }
    }

    pub fn for_count(self, count: usize) -> &'static str {
        if count == 1 {
            self.one
        } else {
            self.many
        }
    }

    /// `"1 record"`, `"12,400 records"`.
    pub fn counted(self, count: usize) -> String {
        format!("{} {}", format_u64_commas(count as u64), self.for_count(count))
    }
}
