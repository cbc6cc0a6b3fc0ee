// SPDX-License-Identifier: MPL-2.0

//! Pushes a few frames through a session and reports what was retired.
//!
//! The first argument picks the backend (`vulkan`, `opengl`, `dx12` or `null`, the default).

use std::time::Duration;

use anyhow::Context as _;
use latte::{
    gpu::{cmd::Builder, Context},
    gx2::{Surface, SurfaceDim, SurfaceFormat, SurfaceUse},
    BackendKind, Config, Session,
};

const FRAMES: u64 = 120;

fn main() -> anyhow::Result<()> {
    let backend = match std::env::args().nth(1) {
        Some(name) => name.parse::<BackendKind>()?,
        None => BackendKind::Null,
    };
    let config = Config { backend, ..Default::default() };
    latte::log::init(&config).context("Failed to initialize logging")?;

    let mut session = Session::init_core(config).context("Failed to initialize the core")?;
    session.init_graphics().context("Failed to initialize graphics")?;
    session.run().context("Failed to start the driver")?;

    let mut scan_buffer = Surface::default();
    scan_buffer.dim.set(SurfaceDim::Texture2d.into());
    scan_buffer.width.set(1280);
    scan_buffer.height.set(720);
    scan_buffer.format.set(SurfaceFormat::UNORM_R8_G8_B8_A8.0);
    scan_buffer.usage.set((SurfaceUse::COLOR_BUFFER | SurfaceUse::SCAN_BUFFER).bits());
    scan_buffer.image.set(0xf400_0000);
    scan_buffer.image_size.set(1280 * 720 * 4);

    for frame in 0..FRAMES {
        let shade = frame as f32 / FRAMES as f32;
        let words = Builder::new()
            .set_color_buffer(0, &scan_buffer)
            .clear_color(0, [shade, 0.0, 1.0 - shade, 1.0])
            .swap_buffers()
            .finish();
        session.submit(&words, Context(frame)).context("Failed to submit a frame")?;
    }

    let done = session.retired().wait_for(Context(FRAMES - 1), Duration::from_secs(30));
    println!(
        "{} frames retired ({}), {:.1} fps",
        session.retired().count(),
        if done { "complete" } else { "timed out" },
        session.average_fps(),
    );
    session.stop().context("The driver failed")?;

    Ok(())
}
