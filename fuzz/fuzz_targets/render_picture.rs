#![no_main]

use cros_vadriver::bridge::null::NullHardware;
use cros_vadriver::buffer::BufferType;
use cros_vadriver::decoder::DecoderConfig;
use cros_vadriver::driver::Driver;
use cros_vadriver::Resolution;
use libfuzzer_sys::fuzz_target;

/// Splits off a chunk whose length is given by the next two bytes of `data`.
fn take_chunk<'a>(data: &mut &'a [u8]) -> &'a [u8] {
    if data.len() < 2 {
        return &[];
    }
    let len = u16::from_le_bytes([data[0], data[1]]) as usize;
    let rest = &data[2..];
    let (chunk, rest) = rest.split_at(len.min(rest.len()));
    *data = rest;
    chunk
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, mut data)) = data.split_first() else {
        return;
    };

    let driver = Driver::default();
    let components = driver.registry().components().collect::<Vec<_>>();
    let Some(&component) = components.get(selector as usize % components.len().max(1)) else {
        return;
    };

    let resolution = Resolution::from((320, 240));
    let Ok(target) = driver.create_surface(resolution) else {
        return;
    };
    let config = DecoderConfig {
        component,
        coded_resolution: resolution,
        slice_size_limit: 256,
        ..Default::default()
    };
    let Ok(context) = driver.create_context(config, &[target], Box::new(NullHardware::new()))
    else {
        return;
    };

    let pic_params = take_chunk(&mut data);
    let slice_params = take_chunk(&mut data);
    let slice_data = data;

    let mut buffers = Vec::new();
    for (buffer_type, chunk) in [
        (BufferType::PictureParameter, pic_params),
        (BufferType::SliceParameter, slice_params),
        (BufferType::SliceData, slice_data),
    ] {
        if chunk.is_empty() {
            continue;
        }
        if let Ok(id) =
            driver.create_buffer(context, buffer_type as u32, chunk.len(), 1, Some(chunk))
        {
            buffers.push(id);
        }
    }

    if driver.begin_picture(context, target).is_ok() {
        let _ = driver.render_picture(context, &buffers);
        let _ = driver.end_picture(context);
        let _ = driver.query_status(context, target);
    }

    let _ = driver.destroy_context(context);
});
