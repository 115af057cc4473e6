// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! ddi_replay, a program replaying an IVF stream through the driver entry points.
//!
//! Every frame of the input goes through `BeginPicture`, `RenderPicture` and `EndPicture` on a
//! context backed by the null hardware, and its completion status is polled right after.
//! Useful to exercise the submission path and to check what the hardware would be given.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use anyhow::Context;
use argh::FromArgs;
use byteorder::ByteOrder;
use byteorder::LittleEndian;
use byteorder::NativeEndian;
use bytes::Buf;
use cros_vadriver::bridge::null::NullHardware;
use cros_vadriver::buffer::slice::SliceDataFlag;
use cros_vadriver::buffer::BufferType;
use cros_vadriver::decoder::DecoderConfig;
use cros_vadriver::driver::Driver;
use cros_vadriver::registry::ComponentInfo;
use cros_vadriver::registry::Entrypoint;
use cros_vadriver::registry::Profile;
use cros_vadriver::Resolution;
use cros_vadriver::SurfaceId;

const IVF_HEADER_SIZE: usize = 32;
const IVF_FRAME_HEADER_SIZE: usize = 12;
const NUM_SURFACES: usize = 8;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum EncodedFormat {
    VP8,
    VP9,
}

impl FromStr for EncodedFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vp8" | "VP8" => Ok(EncodedFormat::VP8),
            "vp9" | "VP9" => Ok(EncodedFormat::VP9),
            _ => Err("unrecognized input format. Valid values: vp8, vp9"),
        }
    }
}

#[derive(Debug)]
enum Md5Computation {
    Stream,
    Frame,
}

impl FromStr for Md5Computation {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream" => Ok(Md5Computation::Stream),
            "frame" => Ok(Md5Computation::Frame),
            _ => Err("unrecognized MD5 computation option. Valid values: stream, frame"),
        }
    }
}

/// Replays an IVF stream through the driver entry points
#[derive(Debug, FromArgs)]
struct Args {
    /// input file
    #[argh(positional)]
    input: PathBuf,

    /// input format. Default: taken from the IVF header
    #[argh(option)]
    input_format: Option<EncodedFormat>,

    /// largest slice the hardware reads in place, in bytes
    #[argh(option)]
    slice_size_limit: Option<usize>,

    /// whether to display the MD5 of the submitted bitstream, and at which granularity (stream
    /// or frame)
    #[argh(option)]
    compute_md5: Option<Md5Computation>,
}

/// Header of an IVF file.
struct IvfHeader {
    fourcc: [u8; 4],
    resolution: Resolution,
}

impl IvfHeader {
    fn parse(data: &[u8]) -> anyhow::Result<Self> {
        if data.len() < IVF_HEADER_SIZE || &data[0..4] != b"DKIF" {
            return Err(anyhow!("not an IVF file"));
        }

        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&data[8..12]);

        Ok(Self {
            fourcc,
            resolution: Resolution::from((
                LittleEndian::read_u16(&data[12..14]) as u32,
                LittleEndian::read_u16(&data[14..16]) as u32,
            )),
        })
    }

    fn format(&self) -> Option<EncodedFormat> {
        match &self.fourcc {
            b"VP80" => Some(EncodedFormat::VP8),
            b"VP90" => Some(EncodedFormat::VP9),
            _ => None,
        }
    }
}

/// Iterator over the frames of an IVF file.
struct IvfIterator<'a> {
    data: &'a [u8],
}

impl<'a> IvfIterator<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data: data.get(IVF_HEADER_SIZE..).unwrap_or_default(),
        }
    }
}

impl<'a> Iterator for IvfIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.remaining() < IVF_FRAME_HEADER_SIZE {
            return None;
        }

        let len = self.data.get_u32_le() as usize;
        // Skip PTS.
        let _ = self.data.get_u64_le();

        if self.data.remaining() < len {
            return None;
        }

        let (frame, rest) = self.data.split_at(len);
        self.data = rest;

        Some(frame)
    }
}

/// Lays out the picture parameters of a frame referencing the previously decoded surfaces.
fn picture_parameters(
    format: EncodedFormat,
    resolution: Resolution,
    references: &[SurfaceId],
) -> Vec<u8> {
    let reference = |i: usize| references.get(i).copied().unwrap_or(SurfaceId::INVALID);

    match format {
        EncodedFormat::VP8 => {
            let mut data = vec![0u8; 20];
            NativeEndian::write_u32(&mut data[0..4], resolution.width);
            NativeEndian::write_u32(&mut data[4..8], resolution.height);
            for i in 0..3 {
                NativeEndian::write_u32(&mut data[8 + 4 * i..12 + 4 * i], reference(i).0);
            }
            data
        }
        EncodedFormat::VP9 => {
            let mut data = vec![0u8; 36];
            NativeEndian::write_u16(&mut data[0..2], resolution.width as u16);
            NativeEndian::write_u16(&mut data[2..4], resolution.height as u16);
            for i in 0..8 {
                NativeEndian::write_u32(&mut data[4 + 4 * i..8 + 4 * i], reference(i).0);
            }
            data
        }
    }
}

fn slice_parameters(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; 12];
    NativeEndian::write_u32(&mut data[0..4], size as u32);
    NativeEndian::write_u32(&mut data[4..8], 0);
    NativeEndian::write_u32(&mut data[8..12], SliceDataFlag::All as u32);
    data
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Args = argh::from_env();

    let input = {
        let mut buf = Vec::new();
        File::open(&args.input)
            .context("error opening input file")?
            .read_to_end(&mut buf)
            .context("error reading input file")?;
        buf
    };

    let header = IvfHeader::parse(&input)?;
    let format = args
        .input_format
        .or_else(|| header.format())
        .ok_or_else(|| anyhow!("unknown stream format, use --input-format"))?;
    let profile = match format {
        EncodedFormat::VP8 => Profile::Vp8Version0_3,
        EncodedFormat::VP9 => Profile::Vp9Profile0,
    };

    let driver = Driver::default();
    let hw = NullHardware::new();

    let surfaces = (0..NUM_SURFACES)
        .map(|_| driver.create_surface(header.resolution))
        .collect::<Result<Vec<_>, _>>()?;

    let mut config = DecoderConfig {
        component: ComponentInfo::new(profile, Entrypoint::Vld),
        coded_resolution: header.resolution,
        ..Default::default()
    };
    if let Some(limit) = args.slice_size_limit {
        config.slice_size_limit = limit;
    }
    let context = driver.create_context(config, &surfaces, Box::new(hw.clone()))?;

    let mut md5_context = md5::Context::new();
    let mut decoded: Vec<SurfaceId> = Vec::new();

    for (num, frame) in IvfIterator::new(&input).enumerate() {
        let target = surfaces[num % NUM_SURFACES];
        // Most recent first.
        let references: Vec<SurfaceId> = decoded.iter().rev().copied().collect();

        let pic_params = picture_parameters(format, header.resolution, &references);
        let slice_params = slice_parameters(frame.len());
        let buffers = [
            driver.create_buffer(
                context,
                BufferType::PictureParameter as u32,
                pic_params.len(),
                1,
                Some(pic_params.as_slice()),
            )?,
            driver.create_buffer(
                context,
                BufferType::SliceParameter as u32,
                slice_params.len(),
                1,
                Some(slice_params.as_slice()),
            )?,
            driver.create_buffer(
                context,
                BufferType::SliceData as u32,
                1,
                frame.len(),
                Some(frame),
            )?,
        ];

        driver.begin_picture(context, target)?;
        driver.render_picture(context, &buffers)?;
        let submission = driver.end_picture(context)?;
        for buffer in buffers {
            driver.release_buffer(context, buffer)?;
        }

        let status = driver.query_status(context, target)?;
        log::info!(
            "frame {}: {} bytes into {} as {:?}, status {:?}",
            num,
            frame.len(),
            target,
            submission,
            status
        );

        match args.compute_md5 {
            None => (),
            Some(Md5Computation::Frame) => println!("{:x}", md5::compute(frame)),
            Some(Md5Computation::Stream) => md5_context.consume(frame),
        }

        decoded.retain(|&s| s != target);
        decoded.push(target);
        if decoded.len() > 3 {
            decoded.remove(0);
        }
    }

    if let Some(Md5Computation::Stream) = args.compute_md5 {
        println!("{:x}", md5_context.compute());
    }

    let submissions = hw.submissions();
    let concealed = submissions
        .iter()
        .flat_map(|s| s.references.iter())
        .filter(|r| r.is_concealed())
        .count();
    println!(
        "{} pictures submitted, {} references concealed",
        submissions.len(),
        concealed
    );

    driver.destroy_context(context)?;

    Ok(())
}
