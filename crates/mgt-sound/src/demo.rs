// demo.rs — sound demo records
//
// Every mutating emitter operation writes one record to the world's demo sink
// in call order, and every world update writes a frame record. Played back through SoundWorld::process_demo_command the
// stream rebuilds the same emitters and channels.
//
// File layout: DEMO_MAGIC, DEMO_VERSION, then for each record its byte length
// followed by the record, all little endian.

use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use mgt_common::common::com_printf;
use mgt_common::q_shared::Vec3;
use mgt_common::qcommon::*;

use crate::channel::LogicalChannel;
use crate::shader::{SoundShaderFlags, SoundShaderParms};

pub const DEMO_MAGIC: i32 = 0x4D44_5347; // "GSDM"
pub const DEMO_VERSION: i32 = 1;
pub const MAX_DEMO_RECORD: usize = 1400;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoundDemoOp {
    AllocEmitter = 0,
    Free = 1,
    Update = 2,
    Start = 3,
    Stop = 4,
    Modify = 5,
    Fade = 6,
    PlaceListener = 7,
    Frame = 8,
}

impl SoundDemoOp {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::AllocEmitter,
            1 => Self::Free,
            2 => Self::Update,
            3 => Self::Start,
            4 => Self::Stop,
            5 => Self::Modify,
            6 => Self::Fade,
            7 => Self::PlaceListener,
            8 => Self::Frame,
            _ => return None,
        })
    }
}

/// One recorded operation. Emitters are named by slot index.
#[derive(Clone, Debug, PartialEq)]
pub enum SoundDemoCommand {
    AllocEmitter { index: u32 },
    Free { index: u32, immediate: bool },
    Update { index: u32, origin: Vec3, listener_id: i32, parms: SoundShaderParms },
    Start { index: u32, shader: String, channel: LogicalChannel, diversity: f32, flags: SoundShaderFlags },
    Stop { index: u32, channel: LogicalChannel },
    Modify { index: u32, channel: LogicalChannel, parms: SoundShaderParms },
    Fade { index: u32, channel: LogicalChannel, to: f32, over: f32 },
    PlaceListener { origin: Vec3, listener_id: i32, area: Option<i32>, time: i32 },
    /// A world update; replaying it recycles drained emitters at the same point.
    Frame { time: i32 },
}

impl SoundDemoCommand {
    pub fn op(&self) -> SoundDemoOp {
        match self {
            Self::AllocEmitter { .. } => SoundDemoOp::AllocEmitter,
            Self::Free { .. } => SoundDemoOp::Free,
            Self::Update { .. } => SoundDemoOp::Update,
            Self::Start { .. } => SoundDemoOp::Start,
            Self::Stop { .. } => SoundDemoOp::Stop,
            Self::Modify { .. } => SoundDemoOp::Modify,
            Self::Fade { .. } => SoundDemoOp::Fade,
            Self::PlaceListener { .. } => SoundDemoOp::PlaceListener,
            Self::Frame { .. } => SoundDemoOp::Frame,
        }
    }
}

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("demo i/o: {0}")]
    Io(#[from] io::Error),
    #[error("not a sound demo (magic {0:#x})")]
    BadMagic(i32),
    #[error("unsupported sound demo version {0}")]
    BadVersion(i32),
    #[error("unknown sound demo command {0}")]
    UnknownCommand(u8),
    #[error("bad logical channel {0}")]
    BadChannel(i32),
    #[error("bad record length {0}")]
    BadLength(i32),
    #[error("truncated sound demo record")]
    Truncated,
}

/// Receives demo records while a world is recording.
pub trait DemoSink: Send {
    fn write_command(&mut self, cmd: &SoundDemoCommand);
}

// ============================================================
// Record codec
// ============================================================

fn write_parms(msg: &mut SizeBuf, parms: &SoundShaderParms) {
    msg_write_float(msg, parms.min_distance);
    msg_write_float(msg, parms.max_distance);
    msg_write_float(msg, parms.volume);
    msg_write_float(msg, parms.shakes);
    msg_write_long(msg, parms.sound_class);
    msg_write_long(msg, parms.flags.bits());
}

fn read_parms(msg: &mut SizeBuf) -> SoundShaderParms {
    SoundShaderParms {
        min_distance: msg_read_float(msg),
        max_distance: msg_read_float(msg),
        volume: msg_read_float(msg),
        shakes: msg_read_float(msg),
        sound_class: msg_read_long(msg),
        flags: SoundShaderFlags::from_bits_retain(msg_read_long(msg)),
    }
}

fn read_channel(msg: &mut SizeBuf) -> Result<LogicalChannel, DemoError> {
    let v = msg_read_long(msg);
    LogicalChannel::from_i32(v).ok_or(DemoError::BadChannel(v))
}

pub fn encode_command(msg: &mut SizeBuf, cmd: &SoundDemoCommand) {
    msg_write_byte(msg, cmd.op() as u8);
    match cmd {
        SoundDemoCommand::AllocEmitter { index } => {
            msg_write_long(msg, *index as i32);
        }
        SoundDemoCommand::Free { index, immediate } => {
            msg_write_long(msg, *index as i32);
            msg_write_byte(msg, *immediate as u8);
        }
        SoundDemoCommand::Update { index, origin, listener_id, parms } => {
            msg_write_long(msg, *index as i32);
            msg_write_vec3(msg, origin);
            msg_write_long(msg, *listener_id);
            write_parms(msg, parms);
        }
        SoundDemoCommand::Start { index, shader, channel, diversity, flags } => {
            msg_write_long(msg, *index as i32);
            msg_write_string(msg, shader);
            msg_write_long(msg, *channel as i32);
            msg_write_float(msg, *diversity);
            msg_write_long(msg, flags.bits());
        }
        SoundDemoCommand::Stop { index, channel } => {
            msg_write_long(msg, *index as i32);
            msg_write_long(msg, *channel as i32);
        }
        SoundDemoCommand::Modify { index, channel, parms } => {
            msg_write_long(msg, *index as i32);
            msg_write_long(msg, *channel as i32);
            write_parms(msg, parms);
        }
        SoundDemoCommand::Fade { index, channel, to, over } => {
            msg_write_long(msg, *index as i32);
            msg_write_long(msg, *channel as i32);
            msg_write_float(msg, *to);
            msg_write_float(msg, *over);
        }
        SoundDemoCommand::PlaceListener { origin, listener_id, area, time } => {
            msg_write_vec3(msg, origin);
            msg_write_long(msg, *listener_id);
            msg_write_long(msg, area.unwrap_or(-1));
            msg_write_long(msg, *time);
        }
        SoundDemoCommand::Frame { time } => {
            msg_write_long(msg, *time);
        }
    }
}

pub fn decode_command(msg: &mut SizeBuf) -> Result<SoundDemoCommand, DemoError> {
    let op = msg_read_byte(msg);
    if op < 0 {
        return Err(DemoError::Truncated);
    }
    let op = SoundDemoOp::from_u8(op as u8).ok_or(DemoError::UnknownCommand(op as u8))?;

    let cmd = match op {
        SoundDemoOp::AllocEmitter => SoundDemoCommand::AllocEmitter { index: msg_read_long(msg) as u32 },
        SoundDemoOp::Free => SoundDemoCommand::Free {
            index: msg_read_long(msg) as u32,
            immediate: msg_read_byte(msg) == 1,
        },
        SoundDemoOp::Update => SoundDemoCommand::Update {
            index: msg_read_long(msg) as u32,
            origin: msg_read_vec3(msg),
            listener_id: msg_read_long(msg),
            parms: read_parms(msg),
        },
        SoundDemoOp::Start => SoundDemoCommand::Start {
            index: msg_read_long(msg) as u32,
            shader: msg_read_string(msg),
            channel: read_channel(msg)?,
            diversity: msg_read_float(msg),
            flags: SoundShaderFlags::from_bits_retain(msg_read_long(msg)),
        },
        SoundDemoOp::Stop => SoundDemoCommand::Stop {
            index: msg_read_long(msg) as u32,
            channel: read_channel(msg)?,
        },
        SoundDemoOp::Modify => SoundDemoCommand::Modify {
            index: msg_read_long(msg) as u32,
            channel: read_channel(msg)?,
            parms: read_parms(msg),
        },
        SoundDemoOp::Fade => SoundDemoCommand::Fade {
            index: msg_read_long(msg) as u32,
            channel: read_channel(msg)?,
            to: msg_read_float(msg),
            over: msg_read_float(msg),
        },
        SoundDemoOp::PlaceListener => {
            let origin = msg_read_vec3(msg);
            let listener_id = msg_read_long(msg);
            let area = msg_read_long(msg);
            SoundDemoCommand::PlaceListener {
                origin,
                listener_id,
                area: (area >= 0).then_some(area),
                time: msg_read_long(msg),
            }
        }
        SoundDemoOp::Frame => SoundDemoCommand::Frame { time: msg_read_long(msg) },
    };

    if msg.read_overflowed() {
        return Err(DemoError::Truncated);
    }
    Ok(cmd)
}

// ============================================================
// Sinks
// ============================================================

/// In-memory record list, shareable between the recording world and a reader.
#[derive(Clone, Default)]
pub struct DemoLog {
    commands: Arc<Mutex<Vec<SoundDemoCommand>>>,
}

impl DemoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<SoundDemoCommand> {
        self.commands.lock().clone()
    }

    pub fn take(&self) -> Vec<SoundDemoCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }
}

impl DemoSink for DemoLog {
    fn write_command(&mut self, cmd: &SoundDemoCommand) {
        self.commands.lock().push(cmd.clone());
    }
}

/// Streams records to a file or any writer. Write errors stop recording;
/// the first one is returned by `finish`.
pub struct DemoWriter<W: Write + Send> {
    out: W,
    msg: SizeBuf,
    error: Option<io::Error>,
    records: usize,
}

impl<W: Write + Send> DemoWriter<W> {
    pub fn new(mut out: W) -> Result<Self, DemoError> {
        out.write_all(&DEMO_MAGIC.to_le_bytes())?;
        out.write_all(&DEMO_VERSION.to_le_bytes())?;
        Ok(Self {
            out,
            msg: SizeBuf::new(MAX_DEMO_RECORD),
            error: None,
            records: 0,
        })
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn finish(mut self) -> Result<W, DemoError> {
        if let Some(err) = self.error.take() {
            return Err(err.into());
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_record(&mut self) -> io::Result<()> {
        let len = self.msg.cursize as i32;
        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(self.msg.as_bytes())
    }
}

impl<W: Write + Send> DemoSink for DemoWriter<W> {
    fn write_command(&mut self, cmd: &SoundDemoCommand) {
        if self.error.is_some() {
            return;
        }
        self.msg.clear();
        encode_command(&mut self.msg, cmd);
        if self.msg.overflowed {
            com_printf(&format!("sound demo record too large ({:?}), dropped\n", cmd.op()));
            return;
        }
        match self.write_record() {
            Ok(()) => self.records += 1,
            Err(err) => {
                com_printf(&format!("sound demo write failed: {}\n", err));
                self.error = Some(err);
            }
        }
    }
}

pub struct DemoReader<R: Read> {
    input: R,
}

impl<R: Read> DemoReader<R> {
    pub fn new(mut input: R) -> Result<Self, DemoError> {
        let magic = read_long(&mut input)?;
        if magic != DEMO_MAGIC {
            return Err(DemoError::BadMagic(magic));
        }
        let version = read_long(&mut input)?;
        if version != DEMO_VERSION {
            return Err(DemoError::BadVersion(version));
        }
        Ok(Self { input })
    }

    /// The next record, or `None` at a clean end of stream.
    pub fn read_command(&mut self) -> Result<Option<SoundDemoCommand>, DemoError> {
        let len = match read_long(&mut self.input) {
            Ok(len) => len,
            Err(DemoError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err),
        };
        if len <= 0 || len as usize > MAX_DEMO_RECORD {
            return Err(DemoError::BadLength(len));
        }

        let mut bytes = vec![0u8; len as usize];
        self.input.read_exact(&mut bytes).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => DemoError::Truncated,
            _ => DemoError::Io(err),
        })?;
        decode_command(&mut SizeBuf::from_bytes(&bytes)).map(Some)
    }

    pub fn read_all(&mut self) -> Result<Vec<SoundDemoCommand>, DemoError> {
        let mut out = Vec::new();
        while let Some(cmd) = self.read_command()? {
            out.push(cmd);
        }
        Ok(out)
    }
}

fn read_long<R: Read>(input: &mut R) -> Result<i32, DemoError> {
    let mut b = [0u8; 4];
    input.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}
