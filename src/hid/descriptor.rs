//! # Report Descriptor Walker
//!
//! Computes the input report length of a device from its raw HID report
//! descriptor. This is the capability query the session runs once per open,
//! so reads use the exact length instead of a guessed constant.
//!
//! Only the items that affect report size are interpreted:
//!
//! | Item | Type | Tag | Effect |
//! |------|------|-----|--------|
//! | Input | Main | 0x8 | adds `size * count` bits to the current report |
//! | Report Size | Global | 0x7 | bits per field |
//! | Report ID | Global | 0x8 | switches report, adds the id prefix byte |
//! | Report Count | Global | 0x9 | fields per main item |
//! | Push / Pop | Global | 0xA / 0xB | save / restore global state |

use std::collections::BTreeMap;

const ITEM_TYPE_MAIN: u8 = 0;
const ITEM_TYPE_GLOBAL: u8 = 1;

const MAIN_INPUT: u8 = 0x8;

const GLOBAL_REPORT_SIZE: u8 = 0x7;
const GLOBAL_REPORT_ID: u8 = 0x8;
const GLOBAL_REPORT_COUNT: u8 = 0x9;
const GLOBAL_PUSH: u8 = 0xA;
const GLOBAL_POP: u8 = 0xB;

/// Prefix byte of a long item.
const LONG_ITEM_PREFIX: u8 = 0xFE;

#[derive(Debug, Clone, Copy, Default)]
struct GlobalState {
    report_size: u32,
    report_count: u32,
    report_id: u8,
}

/// Returns the largest input report length in bytes, including the report
/// id prefix when the descriptor declares report ids.
///
/// Returns `None` when the descriptor declares no input fields.
///
/// # Examples
///
/// ```
/// use flight_hid::hid::descriptor::input_report_len;
///
/// // Joystick: 4 axes x 16 bits, no report id.
/// let descriptor = [
///     0x05, 0x01, 0x09, 0x04, 0xA1, 0x01, // Usage Page/Usage/Collection
///     0x75, 0x10, 0x95, 0x04, 0x81, 0x02, // Size 16, Count 4, Input
///     0xC0,
/// ];
/// assert_eq!(input_report_len(&descriptor), Some(8));
/// ```
#[must_use]
pub fn input_report_len(descriptor: &[u8]) -> Option<usize> {
    let mut state = GlobalState::default();
    let mut stack: Vec<GlobalState> = Vec::new();
    let mut bits_per_report: BTreeMap<u8, u64> = BTreeMap::new();
    let mut uses_report_ids = false;

    let mut i = 0;
    while i < descriptor.len() {
        let prefix = descriptor[i];

        if prefix == LONG_ITEM_PREFIX {
            let data_len = descriptor.get(i + 1).copied().unwrap_or(0) as usize;
            i += 3 + data_len;
            continue;
        }

        let size = match prefix & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let item_type = (prefix >> 2) & 0x03;
        let tag = prefix >> 4;

        if i + 1 + size > descriptor.len() {
            break;
        }
        let value = descriptor[i + 1..i + 1 + size]
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));

        match (item_type, tag) {
            (ITEM_TYPE_MAIN, MAIN_INPUT) => {
                let bits = u64::from(state.report_size) * u64::from(state.report_count);
                *bits_per_report.entry(state.report_id).or_insert(0) += bits;
            }
            (ITEM_TYPE_GLOBAL, GLOBAL_REPORT_SIZE) => state.report_size = value,
            (ITEM_TYPE_GLOBAL, GLOBAL_REPORT_COUNT) => state.report_count = value,
            (ITEM_TYPE_GLOBAL, GLOBAL_REPORT_ID) => {
                state.report_id = value as u8;
                uses_report_ids = true;
            }
            (ITEM_TYPE_GLOBAL, GLOBAL_PUSH) => stack.push(state),
            (ITEM_TYPE_GLOBAL, GLOBAL_POP) => {
                if let Some(saved) = stack.pop() {
                    state = saved;
                }
            }
            _ => {}
        }

        i += 1 + size;
    }

    let prefix_len = usize::from(uses_report_ids);
    bits_per_report
        .values()
        .filter(|&&bits| bits > 0)
        .map(|&bits| (bits as usize).div_ceil(8) + prefix_len)
        .max()
}
