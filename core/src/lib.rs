// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Latte: an emulated GPU command pipeline.
//!
//! A [`Session`] is what a frontend drives. It owns the command ring, picks and starts one graphics
//! driver on a dedicated thread, and records every retired command buffer:
//!
//! ```
//! use latte::{gpu::{cmd::Builder, Context}, BackendKind, Config, Session};
//!
//! let config = Config { backend: BackendKind::Null, ..Default::default() };
//! let mut session = Session::init_core(config)?;
//! session.init_graphics()?;
//! session.run()?;
//!
//! session.submit(&Builder::new().swap_buffers().finish(), Context(1))?;
//! session.stop()?;
//! assert_eq!(session.retired().retired(), vec![Context(1)]);
//! # Ok::<(), latte::Error>(())
//! ```

mod config;
pub mod log;

use std::{
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
};

pub use config::{BackendKind, Config, UnknownBackend};
pub use latte_gpu as gpu;
pub use latte_gx2 as gx2;

use gpu::{
    driver,
    gfx::{self, Api},
    Backend, CommandBuffer, Context, Dispatcher, Driver, NullBackend, Retire, RetireLog, Ring,
    RingClosed,
};

#[derive(Debug)]
pub enum Error {
    /// Graphics or thread setup failed; nothing was started.
    Startup(String),
    /// [`Session::run`] was called before a graphics backend was initialized.
    NoGraphics,
    AlreadyRunning,
    Ring(RingClosed),
    Driver(driver::Error),
    ThreadPanicked,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Startup(reason) => write!(f, "startup failed: {}", reason),
            Self::NoGraphics => f.write_str("no graphics backend was initialized"),
            Self::AlreadyRunning => f.write_str("the session is already running"),
            Self::Ring(e) => write!(f, "{}", e),
            Self::Driver(e) => write!(f, "driver failed: {}", e),
            Self::ThreadPanicked => f.write_str("the dispatch thread panicked"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ring(e) => Some(e),
            Self::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RingClosed> for Error {
    fn from(e: RingClosed) -> Self {
        Self::Ring(e)
    }
}

impl Session {
    /// Creates a session with an empty ring and no graphics yet.
    pub fn init_core(config: Config) -> Result<Self, Error> {
        Self::init(config, None)
    }

    /// Like [`init_core`](Self::init_core), but also hands every retirement to `retire`.
    ///
    /// [`retired`](Self::retired) only holds recent retirements; this is the way to observe all of
    /// them.
    pub fn init_core_with_retire(config: Config, retire: Arc<dyn Retire>) -> Result<Self, Error> {
        Self::init(config, Some(retire))
    }

    fn init(config: Config, observer: Option<Arc<dyn Retire>>) -> Result<Self, Error> {
        if config.thread_name.is_empty() || config.thread_name.contains('\0') {
            return Err(Error::Startup(format!(
                "invalid dispatch thread name {:?}",
                config.thread_name,
            )));
        }
        tracing::debug!("core initialized: {:?}", config);

        Ok(Self {
            ring: Arc::new(Ring::new()),
            retired: Arc::new(RetireLog::with_history(config.retire_history)),
            observer,
            config,
            driver: None,
            thread: None,
        })
    }
}

/// One emulated GPU and the thread that drives it.
pub struct Session {
    config: Config,
    ring: Arc<Ring>,
    retired: Arc<RetireLog>,
    observer: Option<Arc<dyn Retire>>,
    driver: Option<Arc<dyn Driver>>,
    thread: Option<JoinHandle<Result<(), driver::Error>>>,
}

impl Session {
    /// Initializes the backend named by [`Config::backend`].
    pub fn init_graphics(&mut self) -> Result<(), Error> {
        match self.config.backend {
            BackendKind::Vulkan => self.init_vulkan_graphics(),
            BackendKind::OpenGl => self.init_gl_graphics(),
            BackendKind::Dx12 => self.init_dx12_graphics(),
            BackendKind::Null => self.init_null_graphics(),
        }
    }

    pub fn init_vulkan_graphics(&mut self) -> Result<(), Error> {
        self.init_renderer(Api::Vulkan)
    }

    pub fn init_gl_graphics(&mut self) -> Result<(), Error> {
        self.init_renderer(Api::OpenGl)
    }

    pub fn init_dx12_graphics(&mut self) -> Result<(), Error> {
        self.init_renderer(Api::Dx12)
    }

    pub fn init_null_graphics(&mut self) -> Result<(), Error> {
        self.init_with_backend(NullBackend::new()).map(|_| ())
    }

    fn init_renderer(&mut self, api: Api) -> Result<(), Error> {
        self.check_no_graphics()?;
        let renderer = gfx::Renderer::new_blocking(api)
            .map_err(|e| Error::Startup(format!("{} graphics: {}", api.name(), e)))?;

        self.init_with_backend(renderer).map(|_| ())
    }

    /// Installs a driver for `backend` and returns it.
    pub fn init_with_backend<B: Backend + 'static>(
        &mut self,
        backend: B,
    ) -> Result<Arc<Dispatcher<B>>, Error> {
        self.check_no_graphics()?;
        tracing::info!("using the {} backend", backend.name());

        let retire: Arc<dyn Retire> = match self.observer {
            Some(ref observer) => {
                let log = Arc::clone(&self.retired);
                let observer = Arc::clone(observer);
                Arc::new(move |context: Context| {
                    log.notify_retire(context);
                    observer.notify_retire(context);
                })
            }
            None => Arc::clone(&self.retired) as Arc<dyn Retire>,
        };
        let driver = Arc::new(Dispatcher::new(Arc::clone(&self.ring), retire, backend));
        self.driver = Some(Arc::clone(&driver) as Arc<dyn Driver>);

        Ok(driver)
    }

    fn check_no_graphics(&self) -> Result<(), Error> {
        match self.driver {
            Some(ref driver) => Err(Error::Startup(format!(
                "the {} backend is already initialized",
                driver.backend_name(),
            ))),
            None => Ok(()),
        }
    }

    /// Starts the dispatch thread.
    pub fn run(&mut self) -> Result<(), Error> {
        let driver = Arc::clone(self.driver.as_ref().ok_or(Error::NoGraphics)?);
        if self.thread.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let thread = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || driver.run())
            .map_err(|e| Error::Startup(format!("failed to spawn the dispatch thread: {}", e)))?;
        self.thread = Some(thread);

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |it| !it.is_finished())
    }

    /// Queues `words` as one command buffer.
    pub fn submit(&self, words: &[u32], context: Context) -> Result<(), Error> {
        self.push(CommandBuffer::from_words(words, context))
    }

    pub fn push(&self, buffer: CommandBuffer) -> Result<(), Error> {
        self.ring.push(buffer).map_err(Error::Ring)
    }

    pub fn ring(&self) -> &Arc<Ring> {
        &self.ring
    }

    /// The most recent retirements, up to [`Config::retire_history`] of them.
    pub fn retired(&self) -> &Arc<RetireLog> {
        &self.retired
    }

    pub fn driver(&self) -> Option<&Arc<dyn Driver>> {
        self.driver.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn average_fps(&self) -> f32 {
        self.driver.as_ref().map_or(0.0, |it| it.average_fps())
    }

    pub fn notify_cpu_flush(&self, addr: u32, size: u32) {
        if let Some(ref driver) = self.driver {
            driver.notify_cpu_flush(addr, size);
        }
    }

    pub fn notify_gpu_flush(&self, addr: u32, size: u32) {
        if let Some(ref driver) = self.driver {
            driver.notify_gpu_flush(addr, size);
        }
    }

    /// Stops the driver and waits for the dispatch thread.
    ///
    /// Buffers pushed before this call are retired before it returns.
    pub fn stop(&mut self) -> Result<(), Error> {
        match self.driver {
            Some(ref driver) => driver.stop(),
            None => self.ring.close(),
        }

        self.join()
    }

    /// Waits for the dispatch thread to exit, whether through [`stop`](Self::stop) or a fault.
    pub fn join(&mut self) -> Result<(), Error> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        match thread.join() {
            Ok(result) => result.map_err(Error::Driver),
            Err(_) => Err(Error::ThreadPanicked),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.stop() {
                tracing::error!("session ended with an error: {}", e);
            }
        }
    }
}
