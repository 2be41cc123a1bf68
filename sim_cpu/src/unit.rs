//! CPU unit wiring
//!
//! The CPU listens on two ports: the dispatch port receives PCBs and
//! answers each with the PCB at the end of its slice; the interrupt port
//! only raises the engine's interrupt flag.

use crate::engine::{CpuSettings, Engine};
use crate::error::CpuError;
use crate::memory::MemoryClient;
use core_types::ProcessControlBlock;
use ipc::{
    decode_pcb, encode_pcb, Opcode, RemoteError, Reply, RequestHandler, Server, TcpTransport,
    Transport,
};
use log::{info, warn};
use sim_config::CpuConfig;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serves PCB requests on the dispatch port
pub struct DispatchHandler {
    engine: Arc<Engine>,
    running: Mutex<()>,
}

impl DispatchHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            running: Mutex::new(()),
        }
    }

    fn run(&self, pcb: ProcessControlBlock) -> ProcessControlBlock {
        let _slice = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.engine.execute(pcb)
    }
}

impl RequestHandler for DispatchHandler {
    fn handle(&self, opcode: Opcode, body: &[u8]) -> Reply {
        if opcode != Opcode::Pcb {
            return Err(RemoteError::invalid_request(format!(
                "{} is not served on the dispatch port",
                opcode
            )));
        }
        let pcb = decode_pcb(body)?;
        let returned = self.run(pcb);
        Ok(encode_pcb(&returned)?)
    }
}

/// Serves INTERRUPT requests on the interrupt port
pub struct InterruptHandler {
    engine: Arc<Engine>,
}

impl InterruptHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

impl RequestHandler for InterruptHandler {
    fn handle(&self, opcode: Opcode, _body: &[u8]) -> Reply {
        if opcode != Opcode::Interrupt {
            return Err(RemoteError::invalid_request(format!(
                "{} is not served on the interrupt port",
                opcode
            )));
        }
        info!("[CPU] Interrupt received");
        self.engine.interrupt();
        Ok(Vec::new())
    }
}

/// A running CPU unit
pub struct CpuUnit {
    engine: Arc<Engine>,
    dispatch: Server,
    interrupt: Server,
}

impl CpuUnit {
    /// Connects to Memory and starts both listeners as configured
    pub fn start(config: &CpuConfig) -> Result<Self, CpuError> {
        let memory = TcpTransport::connect_with_retry(
            &config.memory_addr,
            Duration::from_millis(config.connect_backoff_ms),
            config.connect_attempts,
        )?;
        info!("[CPU] Connected to Memory at {}", config.memory_addr);
        Self::start_on(
            CpuSettings::from(config),
            Box::new(memory),
            TcpListener::bind(&config.dispatch_listen_addr)?,
            TcpListener::bind(&config.interrupt_listen_addr)?,
        )
    }

    /// Starts over an established Memory link and already bound listeners
    pub fn start_on(
        settings: CpuSettings,
        memory: Box<dyn Transport>,
        dispatch: TcpListener,
        interrupt: TcpListener,
    ) -> Result<Self, CpuError> {
        let engine = Arc::new(Engine::new(settings, MemoryClient::new(memory))?);
        let dispatch = Server::start(
            "cpu-dispatch",
            dispatch,
            Arc::new(DispatchHandler::new(Arc::clone(&engine))),
        )?;
        let interrupt = Server::start(
            "cpu-interrupt",
            interrupt,
            Arc::new(InterruptHandler::new(Arc::clone(&engine))),
        )?;
        Ok(Self {
            engine,
            dispatch,
            interrupt,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn dispatch_addr(&self) -> SocketAddr {
        self.dispatch.local_addr()
    }

    pub fn interrupt_addr(&self) -> SocketAddr {
        self.interrupt.local_addr()
    }

    /// Stops both listeners and closes the Memory link
    pub fn stop(&mut self) {
        self.interrupt.stop();
        self.dispatch.stop();
        self.engine.memory().close();
        warn!("[CPU] CPU has been shut down");
    }
}
