//! Shared inputs for the body and builder benchmarks.

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup) -> Self {
        Self { name, group }
    }

    pub fn small(name: &'static str) -> Self {
        Self::new(name, TestGroup::Small)
    }

    pub fn normal(name: &'static str) -> Self {
        Self::new(name, TestGroup::Normal)
    }

    pub fn large(name: &'static str) -> Self {
        Self::new(name, TestGroup::Large)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    /// Plain text of roughly [`TestGroup::size`] bytes
    pub fn text(&self) -> String {
        let line = "the quick brown fox jumps over the lazy dog\n";
        line.repeat(self.group.size().div_ceil(line.len()))
    }

    /// An urlencoded form with one field per 32 bytes of [`TestGroup::size`]
    pub fn form(&self) -> String {
        (0..self.group.size() / 32).map(|i| format!("field{i}=value%20{i}")).collect::<Vec<_>>().join("&")
    }

    /// The text split into `chunk_size` pieces, as a stream source would yield it
    pub fn chunks(&self, chunk_size: usize) -> Vec<String> {
        let text = self.text();
        text.as_bytes().chunks(chunk_size).map(|chunk| String::from_utf8_lossy(chunk).into_owned()).collect()
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}

impl TestGroup {
    pub fn size(self) -> usize {
        match self {
            TestGroup::Small => 256,
            TestGroup::Normal => 16 * 1024,
            TestGroup::Large => 1024 * 1024,
        }
    }

    /// Number of fragments a builder benchmark appends
    pub fn fragments(self) -> usize {
        match self {
            TestGroup::Small => 4,
            TestGroup::Normal => 32,
            TestGroup::Large => 256,
        }
    }
}
