use std::fmt;

/// Identifies one block of a file: the unit of disk I/O.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockId {
    file_name: String,
    number: u32,
}

impl BlockId {
    pub fn new(file_name: impl Into<String>, number: u32) -> Self {
        Self {
            file_name: file_name.into(),
            number,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// The block immediately before this one in the same file, if any.
    pub fn previous(&self) -> Option<BlockId> {
        self.number
            .checked_sub(1)
            .map(|number| BlockId::new(self.file_name.clone(), number))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[file {}, block {}]", self.file_name, self.number)
    }
}
