// qcommon.rs — message buffers and little-endian read/write helpers

use crate::q_shared::Vec3;

// ============================================================
// SizeBuf
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct SizeBuf {
    pub allow_overflow: bool,
    pub overflowed: bool,
    pub data: Vec<u8>,
    pub maxsize: usize,
    pub cursize: usize,
    pub readcount: usize,
}

impl SizeBuf {
    pub fn new(maxsize: usize) -> Self {
        Self {
            allow_overflow: false,
            overflowed: false,
            data: vec![0u8; maxsize],
            maxsize,
            cursize: 0,
            readcount: 0,
        }
    }

    /// Wrap already-written bytes for reading.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            allow_overflow: false,
            overflowed: false,
            data: bytes.to_vec(),
            maxsize: bytes.len(),
            cursize: bytes.len(),
            readcount: 0,
        }
    }

    pub fn clear(&mut self) {
        self.cursize = 0;
        self.overflowed = false;
    }

    /// Reserve `length` bytes. On overflow the buffer is cleared and flagged
    /// if `allow_overflow` is set, otherwise nothing is written.
    pub fn get_space(&mut self, length: usize) -> Option<usize> {
        if self.cursize + length > self.maxsize {
            if !self.allow_overflow || length > self.maxsize {
                self.overflowed = true;
                return None;
            }
            self.clear();
            self.overflowed = true;
        }
        let start = self.cursize;
        self.cursize += length;
        Some(start)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        if let Some(start) = self.get_space(bytes.len()) {
            self.data[start..start + bytes.len()].copy_from_slice(bytes);
        }
    }

    /// The written portion of the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.cursize]
    }

    /// True once a read has run past the written data.
    pub fn read_overflowed(&self) -> bool {
        self.readcount > self.cursize
    }
}

// ============================================================
// Writing
// ============================================================

pub fn msg_write_byte(sb: &mut SizeBuf, c: u8) {
    sb.write(&[c]);
}

pub fn msg_write_long(sb: &mut SizeBuf, c: i32) {
    if let Some(start) = sb.get_space(4) {
        sb.data[start..start + 4].copy_from_slice(&c.to_le_bytes());
    }
}

pub fn msg_write_float(sb: &mut SizeBuf, f: f32) {
    if let Some(start) = sb.get_space(4) {
        sb.data[start..start + 4].copy_from_slice(&f.to_le_bytes());
    }
}

pub fn msg_write_string(sb: &mut SizeBuf, s: &str) {
    sb.write(s.as_bytes());
    sb.write(&[0]);
}

/// Full precision position, three floats.
pub fn msg_write_vec3(sb: &mut SizeBuf, v: &Vec3) {
    msg_write_float(sb, v[0]);
    msg_write_float(sb, v[1]);
    msg_write_float(sb, v[2]);
}

// ============================================================
// Reading
// ============================================================

pub fn msg_read_byte(msg: &mut SizeBuf) -> i32 {
    let rc = msg.readcount;
    msg.readcount += 1;
    if rc + 1 > msg.cursize {
        -1
    } else {
        msg.data[rc] as i32
    }
}

pub fn msg_read_long(msg: &mut SizeBuf) -> i32 {
    let rc = msg.readcount;
    msg.readcount += 4;
    if rc + 4 > msg.cursize {
        -1
    } else {
        i32::from_le_bytes([msg.data[rc], msg.data[rc + 1], msg.data[rc + 2], msg.data[rc + 3]])
    }
}

pub fn msg_read_float(msg: &mut SizeBuf) -> f32 {
    let rc = msg.readcount;
    msg.readcount += 4;
    if rc + 4 > msg.cursize {
        -1.0
    } else {
        f32::from_le_bytes([msg.data[rc], msg.data[rc + 1], msg.data[rc + 2], msg.data[rc + 3]])
    }
}

pub fn msg_read_string(msg: &mut SizeBuf) -> String {
    let mut bytes = Vec::new();
    loop {
        let c = msg_read_byte(msg);
        if c == -1 || c == 0 {
            break;
        }
        bytes.push(c as u8);
        if bytes.len() >= 2047 {
            break;
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn msg_read_vec3(msg: &mut SizeBuf) -> Vec3 {
    [msg_read_float(msg), msg_read_float(msg), msg_read_float(msg)]
}
