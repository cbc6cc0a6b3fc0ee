// SPDX-License-Identifier: MPL-2.0

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use latte::{
    gpu::{
        backend::{self, Counters, Draw, Flush, PrimitiveType},
        cmd::{reg, Builder, Opcode},
        driver::{self, State},
        Backend, CommandBuffer, Context, NullBackend,
    },
    gx2::{Surface, SurfaceDim, SurfaceFormat, SurfaceUse, Texture},
    BackendKind, Config, Error, Session,
};
use rand::Rng as _;

const TIMEOUT: Duration = Duration::from_secs(10);

fn null_session() -> Session {
    let config = Config { backend: BackendKind::Null, ..Default::default() };
    let mut session = Session::init_core(config).unwrap();
    session.init_graphics().unwrap();

    session
}

fn frame_surface() -> Surface {
    let mut surface = Surface::default();
    surface.dim.set(SurfaceDim::Texture2d.into());
    surface.width.set(1280);
    surface.height.set(720);
    surface.format.set(SurfaceFormat::UNORM_R8_G8_B8_A8.0);
    surface.usage.set((SurfaceUse::COLOR_BUFFER | SurfaceUse::TEXTURE).bits());
    surface.image.set(0xf400_0000);
    surface.image_size.set(1280 * 720 * 4);
    surface.pitch.set(1280);

    surface
}

#[test]
fn unknown_opcode_is_skipped_and_retired() {
    let mut session = null_session();
    session.run().unwrap();

    session.submit(&Builder::new().nop().finish(), Context(1)).unwrap();
    let broken = Builder::new()
        .clear_color(0, [0.0; 4])
        .type3(Opcode::Unknown(0xf0), &[7])
        .nop()
        .finish();
    session.submit(&broken, Context(2)).unwrap();
    session.submit(&Builder::new().swap_buffers().finish(), Context(3)).unwrap();

    assert!(session.retired().wait_for(Context(3), TIMEOUT));
    session.stop().unwrap();

    assert_eq!(session.retired().retired(), vec![Context(1), Context(2), Context(3)]);
}

#[test]
fn a_whole_frame_reaches_the_backend() {
    let mut session = Session::init_core(Config::default()).unwrap();
    let driver = session.init_with_backend(NullBackend::new()).unwrap();
    let counters = driver.with_backend(NullBackend::counters);
    session.run().unwrap();

    let frame = Builder::new()
        .set_color_buffer(0, &frame_surface())
        .clear_color(0, [0.1, 0.2, 0.3, 1.0])
        .set_pixel_texture(0, &Texture::new(frame_surface()))
        .set_config_reg(reg::VGT_PRIMITIVE_TYPE, &[PrimitiveType::TriangleList as u32])
        .num_instances(1)
        .draw_auto(3)
        .swap_buffers()
        .into_buffer(Context(42));
    session.push(frame).unwrap();
    session.stop().unwrap();

    assert_eq!(session.retired().last(), Some(Context(42)));
    assert_eq!(Counters::get(&counters.color_buffers), 1);
    assert_eq!(Counters::get(&counters.textures), 1);
    assert_eq!(Counters::get(&counters.clears), 1);
    assert_eq!(Counters::get(&counters.vertices), 3);
    assert_eq!(Counters::get(&counters.swaps), 1);
    assert_eq!(driver.with_executor(|it| it.frames()), 1);
}

#[test]
fn empty_buffers_are_never_retired() {
    let mut session = null_session();
    session.run().unwrap();

    session.push(CommandBuffer::from_words(&[], Context(1))).unwrap();
    session.submit(&Builder::new().nop().finish(), Context(2)).unwrap();
    session.stop().unwrap();

    assert_eq!(session.retired().retired(), vec![Context(2)]);
}

#[test]
fn stop_releases_an_idle_driver_promptly() {
    let mut session = null_session();
    session.run().unwrap();
    thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    session.stop().unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(!session.is_running());
    assert_eq!(session.driver().map(|it| it.state()), Some(State::Stopped));
}

#[test]
fn concurrent_pushes_and_stop_lose_nothing() {
    const PRODUCERS: u64 = 4;

    for round in 0..20 {
        let mut session = null_session();
        session.run().unwrap();

        let accepted = Arc::new(AtomicU64::new(0));
        let producers = (0..PRODUCERS)
            .map(|producer| {
                let ring = Arc::clone(session.ring());
                let accepted = Arc::clone(&accepted);
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    let mut rejected = false;
                    for idx in 0..200 {
                        let context = Context((producer << 32) | idx);
                        match ring.push(Builder::new().nop().into_buffer(context)) {
                            Ok(()) => {
                                // Once refused, a push is refused forever.
                                assert!(!rejected, "push accepted after a rejection");
                                accepted.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(_) => rejected = true,
                        }
                        if rng.gen_ratio(1, 8) {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        thread::sleep(Duration::from_micros(rand::thread_rng().gen_range(0..500)));
        session.stop().unwrap();
        for producer in producers {
            producer.join().unwrap();
        }

        let retired = session.retired().retired();
        assert_eq!(
            retired.len() as u64,
            accepted.load(Ordering::SeqCst),
            "round {}: an accepted push was not retired",
            round,
        );
        for producer in 0..PRODUCERS {
            let own = retired
                .iter()
                .filter(|it| it.0 >> 32 == producer)
                .map(|it| it.0 & 0xffff_ffff)
                .collect::<Vec<_>>();
            assert!(own.windows(2).all(|it| it[0] < it[1]), "round {}: reordered", round);
        }
    }
}

/// Counts buffers and loses its device on the `fail_at`th submission.
struct LosingBackend {
    submits: Arc<AtomicU64>,
    fail_at: u64,
}

impl Backend for LosingBackend {
    fn name(&self) -> &'static str {
        "losing"
    }

    fn set_register(&mut self, _: u32, _: u32) -> Result<(), backend::Error> {
        Ok(())
    }

    fn set_color_buffer(&mut self, _: u32, _: &Surface) -> Result<(), backend::Error> {
        Ok(())
    }

    fn set_pixel_texture(&mut self, _: u32, _: &Texture) -> Result<(), backend::Error> {
        Ok(())
    }

    fn clear_color(&mut self, _: u32, _: [f32; 4]) -> Result<(), backend::Error> {
        Ok(())
    }

    fn draw(&mut self, _: Draw) -> Result<(), backend::Error> {
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), backend::Error> {
        Ok(())
    }

    fn invalidate(&mut self, _: Flush) -> Result<(), backend::Error> {
        Ok(())
    }

    fn submit(&mut self) -> Result<(), backend::Error> {
        let count = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if count == self.fail_at {
            Err(backend::Error::DeviceLost(String::from("out of memory")))
        } else {
            Ok(())
        }
    }
}

#[test]
fn device_loss_surfaces_from_join() {
    let submits = Arc::new(AtomicU64::new(0));
    let mut session = Session::init_core(Config::default()).unwrap();
    session
        .init_with_backend(LosingBackend { submits: Arc::clone(&submits), fail_at: 2 })
        .unwrap();
    for context in 1..=3 {
        session.submit(&Builder::new().nop().finish(), Context(context)).unwrap();
    }
    session.run().unwrap();

    match session.join() {
        Err(Error::Driver(driver::Error::DeviceLost(reason))) => {
            assert_eq!(reason, "out of memory");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(session.driver().map(|it| it.state()), Some(State::Faulted));
    assert_eq!(session.retired().retired(), vec![Context(1)]);
    assert_eq!(submits.load(Ordering::SeqCst), 2);
    // The ring closes with the driver, so producers find out.
    assert!(matches!(session.submit(&[0x8000_0000], Context(4)), Err(Error::Ring(_))));
}

#[test]
fn flush_notifications_are_forwarded() {
    let mut session = Session::init_core(Config::default()).unwrap();
    let driver = session.init_with_backend(NullBackend::new()).unwrap();
    session.run().unwrap();

    session.notify_cpu_flush(0xf400_0000, 0x1000);
    session.submit(&Builder::new().surface_sync(0xf400_0000, 0x1000).finish(), Context(1))
        .unwrap();
    session.stop().unwrap();

    driver.with_backend(|backend| {
        assert_eq!(Counters::get(&backend.counters().invalidations), 2);
    });
}

#[test]
fn every_retirement_reaches_a_custom_notifier() {
    let seen = Arc::new(AtomicU64::new(0));
    let retire = {
        let seen = Arc::clone(&seen);
        move |_: Context| {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    };
    let config = Config { backend: BackendKind::Null, retire_history: 4, ..Default::default() };
    let mut session = Session::init_core_with_retire(config, Arc::new(retire)).unwrap();
    session.init_graphics().unwrap();
    session.run().unwrap();

    for context in 0..10 {
        session.submit(&Builder::new().nop().finish(), Context(context)).unwrap();
    }
    session.stop().unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 10);
    assert_eq!(session.retired().count(), 10);
    assert_eq!(session.retired().retired(), (6..10).map(Context).collect::<Vec<_>>());
}
