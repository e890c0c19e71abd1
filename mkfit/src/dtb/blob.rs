//! Structural check of a flattened devicetree
//!
//! The `fdt` reader trusts the header offsets and the string table once the
//! magic and `totalsize` look right, and panics on anything else. Blobs from
//! disk go through [`check_blob`] first.

use byteorder::{BigEndian, ByteOrder};

use crate::fit::dt_builder::{
    FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_MAGIC, FDT_NOP, FDT_PROP, HEADER_SIZE,
};

/// Check the header, block bounds and token stream of `data`.
///
/// Returns the header `totalsize`.
pub fn check_blob(data: &[u8]) -> Result<usize, String> {
    if data.len() < HEADER_SIZE {
        return Err(format!("{} bytes is too short for an FDT header", data.len()));
    }
    let field = |index: usize| BigEndian::read_u32(&data[index * 4..]);

    let magic = field(0);
    if magic != FDT_MAGIC {
        return Err(format!("bad magic {magic:#010x}"));
    }
    let total = field(1) as usize;
    if total > data.len() {
        return Err(format!(
            "totalsize {total:#x} exceeds the {:#x} bytes available",
            data.len()
        ));
    }

    let block = move |name: &'static str, off: u32, size: u32| {
        let (off, size) = (off as usize, size as usize);
        off.checked_add(size)
            .filter(|&end| end <= total)
            .map(|end| &data[off..end])
            .ok_or_else(|| format!("{name} block {off:#x}+{size:#x} exceeds totalsize {total:#x}"))
    };
    let structure = block("structure", field(2), field(9))?;
    let strings = block("strings", field(3), field(8))?;

    walk_structure(structure, strings)?;
    Ok(total)
}

fn walk_structure(structure: &[u8], strings: &[u8]) -> Result<(), String> {
    let mut pos = 0usize;
    let mut depth = 0usize;
    loop {
        let token = be32(structure, pos)?;
        pos += 4;
        match token {
            FDT_BEGIN_NODE => {
                let name = cstr(structure, pos)?;
                pos = align4(pos + name.len() + 1);
                depth += 1;
            }
            FDT_END_NODE => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced end of node at {pos:#x}"))?;
            }
            FDT_PROP => {
                let len = be32(structure, pos)? as usize;
                let name_off = be32(structure, pos + 4)? as usize;
                pos += 8;
                let end = pos
                    .checked_add(len)
                    .filter(|&end| end <= structure.len())
                    .ok_or_else(|| format!("property at {pos:#x} runs past the structure block"))?;
                cstr(strings, name_off)?;
                pos = align4(end);
            }
            FDT_NOP => {}
            FDT_END if depth == 0 => return Ok(()),
            FDT_END => return Err(format!("{depth} node(s) left open")),
            other => return Err(format!("unknown token {other:#x} at {:#x}", pos - 4)),
        }
    }
}

fn be32(buf: &[u8], off: usize) -> Result<u32, String> {
    off.checked_add(4)
        .and_then(|end| buf.get(off..end))
        .map(BigEndian::read_u32)
        .ok_or_else(|| format!("truncated at offset {off:#x}"))
}

fn cstr(buf: &[u8], off: usize) -> Result<&str, String> {
    let rest = buf
        .get(off..)
        .ok_or_else(|| format!("string offset {off:#x} out of range"))?;
    let nul = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| format!("unterminated string at {off:#x}"))?;
    std::str::from_utf8(&rest[..nul]).map_err(|_| format!("string at {off:#x} is not UTF-8"))
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::DeviceTreeBuilder;

    fn blob() -> Vec<u8> {
        let mut dt = DeviceTreeBuilder::new();
        dt.node("", |dt| {
            dt.property_string("model", "m")?;
            dt.node("chosen", |dt| dt.property_u32("x", 1))
        })
        .unwrap();
        dt.finish().unwrap()
    }

    fn set_field(data: &mut [u8], index: usize, value: u32) {
        BigEndian::write_u32(&mut data[index * 4..], value);
    }

    #[test]
    fn test_well_formed() {
        let data = blob();
        assert_eq!(check_blob(&data).unwrap(), data.len());
    }

    #[test]
    fn test_block_offsets_outside_blob() {
        let mut data = vec![0u8; 64];
        set_field(&mut data, 0, FDT_MAGIC);
        set_field(&mut data, 1, 64);
        set_field(&mut data, 2, 0x7fff_0000);
        set_field(&mut data, 3, 0x7fff_0000);
        let err = check_blob(&data).unwrap_err();
        assert!(err.contains("exceeds totalsize"), "{err}");
    }

    #[test]
    fn test_truncated_and_bad_magic() {
        let data = blob();
        assert!(check_blob(&data[..data.len() / 2]).is_err());
        assert!(check_blob(&data[..12]).is_err());

        let mut bad = data.clone();
        bad[0] = 0;
        assert!(check_blob(&bad).unwrap_err().contains("magic"));
    }

    #[test]
    fn test_corrupt_string_table() {
        let mut data = blob();
        let off_strings = BigEndian::read_u32(&data[12..]) as usize;
        data[off_strings] = 0xff;
        assert!(check_blob(&data).unwrap_err().contains("UTF-8"));

        let mut data = blob();
        let size_strings = BigEndian::read_u32(&data[32..]);
        // drop the final NUL of the last name
        set_field(&mut data, 8, size_strings - 1);
        assert!(check_blob(&data).unwrap_err().contains("unterminated"));
    }

    #[test]
    fn test_unknown_token() {
        let mut data = blob();
        let off_struct = BigEndian::read_u32(&data[8..]) as usize;
        BigEndian::write_u32(&mut data[off_struct..], 0x77);
        assert!(check_blob(&data).unwrap_err().contains("unknown token"));
    }
}
