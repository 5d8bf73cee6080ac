/// Lifecycle step announced by a diagnostic emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Obtaining,
    Obtained,
    Releasing,
    Released,
    Trying,
    ObtainingRead,
    ObtainedRead,
    ReleasingRead,
    ReleasedRead,
    TryingRead,
}

impl Action {
    pub fn phrase(self) -> &'static str {
        match self {
            Self::Obtaining => "obtaining lock",
            Self::Obtained => "obtained lock",
            Self::Releasing => "releasing lock",
            Self::Released => "released lock",
            Self::Trying => "trying lock",
            Self::ObtainingRead => "obtaining read lock",
            Self::ObtainedRead => "obtained read lock",
            Self::ReleasingRead => "releasing read lock",
            Self::ReleasedRead => "released read lock",
            Self::TryingRead => "trying read lock",
        }
    }
}

/// Builds one emission block: the stack lines with the first line annotated by
/// the action phrase and, when non-empty, the quoted label. The result always
/// ends with a single newline.
pub fn format_event(lines: &[String], action: Action, label: &str) -> String {
    let capacity = lines.iter().map(|line| line.len() + 1).sum::<usize>() + 64;
    let mut block = String::with_capacity(capacity);

    if let Some(first) = lines.first() {
        block.push_str(first);
        block.push(' ');
    }
    block.push_str(action.phrase());
    if !label.is_empty() {
        block.push_str(&format!(" for {label:?}"));
    }

    for line in lines.iter().skip(1) {
        block.push('\n');
        block.push_str(line);
    }
    block.push('\n');
    block
}
