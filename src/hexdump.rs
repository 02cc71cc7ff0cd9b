//! Hexdumps for trace logging of transferred bytes.

use std::fmt::Write;

use crate::Address;

const BYTES_PER_LINE: usize = 16;

/// Render `bytes` as they lie in memory starting at `start`.
///
/// Each line shows 16 bytes prefixed with the address of its first byte, with an extra gap after
/// the eighth byte. Lines are aligned to 16-byte addresses, so when `start` is not aligned the
/// first line is padded up to the first byte.
pub fn hexdump(bytes: &[u8], start: Address) -> String {
    let lead = start % BYTES_PER_LINE;
    let first = start - lead;
    let mut out = String::new();
    let mut line = String::new();
    for offset in 0..lead + bytes.len() {
        let column = offset % BYTES_PER_LINE;
        if column == 0 {
            push_line(&mut out, &mut line);
            let _ = write!(line, "0x{:08X}:", first.wrapping_add(offset));
        }
        if column == 8 {
            line.push(' ');
        }
        match offset.checked_sub(lead) {
            Some(index) => {
                let _ = write!(line, " {:02X}", bytes[index]);
            }
            None => line.push_str("   "),
        }
    }
    push_line(&mut out, &mut line);
    out
}

fn push_line(out: &mut String, line: &mut String) {
    if line.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(line.trim_end());
    line.clear();
}
