//! Instructions sent to the collaborator, one per refinement step.

use crate::refinement::response::StructuralUnit;
use std::fmt::Write;

pub const STRUCTURAL_INSTRUCTION: &str = "\
You are analysing one tall screenshot of a mobile application, top to bottom.
Split it into the logical UI units a person would perceive, following these rules:
- Ignore the system status bar (clock, battery, signal) entirely.
- The row holding the app name or screen title is always its own first unit.
- A heading and the content it introduces form one unit.
- A toolbar or a group of navigation controls forms one unit.
- A group of fields showing account or other sensitive information forms one unit.
- The bottom navigation bar, if present, is its own last unit.
Number the units from 1 in top-to-bottom order and describe each one briefly.
Respond with JSON only, in exactly this shape:
{\"units\": [{\"sequence\": 1, \"description\": \"...\"}]}";

/// Asks which numbered boxes of the annotated preview make up each unit.
pub fn mapping_instruction(units: &[StructuralUnit], segment_count: usize) -> String {
    let mut text = String::from(
        "The attached screenshot has numbered colored boxes drawn over its content blocks.\n",
    );
    let _ = writeln!(text, "There are {segment_count} boxes, numbered 1 to {segment_count}.");
    text.push_str("These are the logical UI units of the screen, in top-to-bottom order:\n");
    for unit in units {
        let _ = writeln!(text, "{}. {}", unit.sequence, unit.description);
    }
    text.push_str(
        "For every unit, list the box numbers that belong to it. A box belongs to at most \
         one unit; leave out units that have no box.\n\
         Respond with JSON only, in exactly this shape:\n\
         {\"mappings\": [{\"sequence\": 1, \"mappedIndices\": [1, 2]}]}",
    );
    text
}

fn index_list(indices: &[usize]) -> String {
    indices.iter().map(usize::to_string).collect::<Vec<_>>().join(",")
}

/// Asks whether two vertically adjacent regions belong to the same UI unit. The
/// first image is the upper region, the second the lower one.
pub fn relevance_instruction(upper: &[usize], lower: &[usize], context: &[StructuralUnit]) -> String {
    let mut text = String::from(
        "The two attached images are vertically adjacent regions of one mobile screenshot; \
         the first sits directly above the second.\n\
         Do they belong to the same logical UI unit (for example a heading and its content, \
         or one card split by a thin line)?\n",
    );
    if !context.is_empty() {
        text.push_str("For context, the screen contains these units from top to bottom:\n");
        for unit in context {
            let _ = writeln!(text, "{}. {}", unit.sequence, unit.description);
        }
    }
    text.push_str("Respond with JSON only, in exactly this shape: {\"related\": true}\n");
    let _ = writeln!(text, "Upper region: segments {}", index_list(upper));
    let _ = write!(text, "Lower region: segments {}", index_list(lower));
    text
}
