//! Section lookup over a book module's tree.
//!
//! Sections are matched by exact name. A node named `"<start> to <end>"`
//! groups numbered sections: when the numeric target falls inside the range
//! the walk descends into it in sibling mode, where the matching section and
//! every section after it at the same level are returned together.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::backend::TreeCursor;

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s+to\s+(\d+)\s*$").unwrap());

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionLookup {
    Found(String),
    FoundWithSiblings(String),
    NotFound,
}

struct Frame {
    siblings: bool,
    found: bool,
    texts: Vec<String>,
}

impl Frame {
    fn new(siblings: bool) -> Self {
        Self {
            siblings,
            found: false,
            texts: Vec::new(),
        }
    }
}

fn range_contains(name: &str, target: Option<u64>) -> bool {
    let Some(target) = target else {
        return false;
    };
    let Some(caps) = RANGE_RE.captures(name) else {
        return false;
    };
    let start = caps[1].parse::<u64>().ok();
    let end = caps[2].parse::<u64>().ok();
    matches!((start, end), (Some(s), Some(e)) if s <= target && target <= e)
}

/// Depth-first search for section `id` below the cursor's current node.
///
/// Iterative: one [`Frame`] per tree level replaces the call stack. The
/// cursor is left wherever the search stopped.
pub fn find_section(cursor: &mut dyn TreeCursor, id: &str) -> SectionLookup {
    let target = id.trim().parse::<u64>().ok();

    if !cursor.first_child() {
        return SectionLookup::NotFound;
    }
    let mut stack = vec![Frame::new(false)];

    loop {
        let Some(frame) = stack.last_mut() else {
            return SectionLookup::NotFound;
        };
        let name = cursor.local_name();
        let mut descend = None;

        if frame.found {
            frame.texts.push(cursor.text());
        } else if name == id {
            if frame.siblings {
                frame.found = true;
                frame.texts.push(cursor.text());
            } else {
                return SectionLookup::Found(cursor.text());
            }
        } else if range_contains(&name, target) {
            trace!(range = %name, id, "descending into section range");
            descend = Some(true);
        } else {
            descend = Some(frame.siblings);
        }

        if let Some(siblings) = descend {
            if cursor.first_child() {
                stack.push(Frame::new(siblings));
                continue;
            }
        }

        // Advance to the next node, closing exhausted levels on the way up.
        loop {
            if cursor.next_sibling() {
                break;
            }
            let Some(done) = stack.pop() else {
                return SectionLookup::NotFound;
            };
            if done.found {
                return SectionLookup::FoundWithSiblings(done.texts.join("\n"));
            }
            if stack.is_empty() {
                return SectionLookup::NotFound;
            }
            cursor.parent();
        }
    }
}
