use heapless::String;

use super::Uuid;

const AD_INCOMPLETE_16: u8 = 0x02;
const AD_COMPLETE_16: u8 = 0x03;
const AD_INCOMPLETE_32: u8 = 0x04;
const AD_COMPLETE_32: u8 = 0x05;
const AD_INCOMPLETE_128: u8 = 0x06;
const AD_COMPLETE_128: u8 = 0x07;
const AD_SHORT_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;

/// Iterate `(ad_type, payload)` pairs, stopping at the first malformed
/// length byte.
fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        let len = *data.get(i)? as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let ad_type = data[i + 1];
        let payload = &data[i + 2..i + 1 + len];
        i += len + 1;
        Some((ad_type, payload))
    })
}

/// Check if raw advertisement data lists `service` in any of its
/// 16-, 32- or 128-bit service UUID fields.
///
/// Short forms only match when `service` sits on the Bluetooth Base UUID.
pub fn contains_service_uuid(data: &[u8], service: Uuid) -> bool {
    let full = service.to_le_bytes();
    let short16 = service.as_u16().map(u16::to_le_bytes);
    let short32 = service.as_u32().map(u32::to_le_bytes);

    ad_structures(data).any(|(ad_type, payload)| match ad_type {
        AD_INCOMPLETE_16 | AD_COMPLETE_16 => short16
            .map(|id| payload.chunks_exact(2).any(|c| c == id))
            .unwrap_or(false),
        AD_INCOMPLETE_32 | AD_COMPLETE_32 => short32
            .map(|id| payload.chunks_exact(4).any(|c| c == id))
            .unwrap_or(false),
        AD_INCOMPLETE_128 | AD_COMPLETE_128 => payload.chunks_exact(16).any(|c| c == full),
        _ => false,
    })
}

/// Extract complete/shortened local name from advertisement data.
pub fn extract_device_name(data: &[u8]) -> String<32> {
    let mut name = String::new();
    let Some((_, raw)) = ad_structures(data)
        .find(|(ad_type, _)| *ad_type == AD_SHORT_NAME || *ad_type == AD_COMPLETE_NAME)
    else {
        let _ = name.push_str("Unknown");
        return name;
    };

    // Peers cut names mid-character; keep the part that decodes.
    let text = match core::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => core::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default(),
    };
    let mut end = text.len().min(name.capacity());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let _ = name.push_str(&text[..end]);
    name
}
