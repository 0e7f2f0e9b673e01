//! Display text for tooltips.

use crate::projector::Direction;

/// Rounded to whole units with `,` thousands separators.
pub fn format_number(v: f64) -> String {
    let rounded = v.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Magnitude with a credit/debit suffix: negative flows are `CR`.
pub fn format_flow(v: f64) -> String {
    let suffix = if v < 0.0 { " CR" } else { " DR" };
    format!("{}{suffix}", format_number(v.abs()))
}

pub fn node_hint(name: &str, net_flow: f64, has_children: bool) -> String {
    let mut text = format!("{name}\nNet flow: {}", format_flow(net_flow));
    if has_children {
        text.push_str("\n(Double click to expand)");
    }
    text
}

pub fn collapser_hint(name: &str) -> String {
    format!("{name}\n(Double click to collapse)")
}

pub fn link_label(source: &str, target: &str, value: f64, direction: Direction) -> String {
    match direction {
        Direction::Forward => format!("{source}  ->  {target}\n{}", format_number(value)),
        Direction::Backward => format!("{target}  <-  {source}\n{}", format_number(value)),
    }
}
