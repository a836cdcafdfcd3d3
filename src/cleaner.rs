//! Turns raw model output into a bare HTML document.
//!
//! Models usually wrap the document in a fenced code block and sometimes add a
//! sentence of prose around it. [`strip_fences`] keeps only the fenced body.
//! It runs on the cumulative text of every stream chunk, so it must cope with
//! half-written fences and must be idempotent.

fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

// A line that could still grow into a fence on the next chunk.
fn is_partial_fence(line: &str) -> bool {
    let t = line.trim();
    !t.is_empty() && t.chars().all(|c| c == '`')
}

pub fn strip_fences(raw: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut opened = false;

    for line in raw.lines() {
        if is_fence_line(line) {
            if opened {
                break;
            }
            // Anything before the opening fence is commentary.
            opened = true;
            kept.clear();
            continue;
        }
        kept.push(line);
    }

    while let Some(last) = kept.last() {
        if last.trim().is_empty() || is_partial_fence(last) {
            kept.pop();
        } else {
            break;
        }
    }

    kept.join("\n").trim().to_string()
}
