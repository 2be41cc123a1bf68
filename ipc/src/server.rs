//! Request/response server loop
//!
//! A unit exposes its endpoints by implementing [`RequestHandler`]. The
//! server owns the framing: every request gets exactly one tagged reply,
//! and DISCONNECT ends the connection without one.

use crate::error::WireError;
use crate::frame::Frame;
use crate::opcode::Opcode;
use crate::payload::{encode_reply, Reply};
use crate::transport::{TcpTransport, Transport};
use log::{debug, error, info, warn};
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Endpoint logic of a unit
pub trait RequestHandler: Send + Sync {
    /// Handles one request and produces its reply
    fn handle(&self, opcode: Opcode, body: &[u8]) -> Reply;
}

/// Serves requests on one transport until the peer disconnects
pub fn serve_connection<T, H>(transport: &mut T, handler: &H) -> Result<(), WireError>
where
    T: Transport + ?Sized,
    H: RequestHandler + ?Sized,
{
    loop {
        let request = match transport.receive() {
            Ok(frame) => frame,
            Err(WireError::Disconnected) => return Ok(()),
            Err(err) => return Err(err),
        };

        if request.opcode == Opcode::Disconnect {
            debug!("[Server] Peer sent DISCONNECT");
            return Ok(());
        }

        let reply = handler.handle(request.opcode, &request.payload);
        if let Err(remote) = &reply {
            debug!("[Server] {} failed: {}", request.opcode, remote);
        }
        let frame = Frame::new(request.opcode.reply_opcode(), encode_reply(&reply));
        match transport.send(frame) {
            Ok(()) => {}
            Err(WireError::Disconnected) => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

/// A listening server running on its own accept thread
pub struct Server {
    name: String,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
    connections: Arc<Mutex<Vec<(TcpStream, JoinHandle<()>)>>>,
}

impl Server {
    /// Binds `addr` and starts accepting connections
    ///
    /// Each accepted connection is served on its own thread.
    pub fn bind<H>(name: impl Into<String>, addr: &str, handler: Arc<H>) -> io::Result<Server>
    where
        H: RequestHandler + 'static,
    {
        let listener = TcpListener::bind(addr)?;
        Self::start(name, listener, handler)
    }

    /// Starts accepting on an already bound listener
    pub fn start<H>(name: impl Into<String>, listener: TcpListener, handler: Arc<H>) -> io::Result<Server>
    where
        H: RequestHandler + 'static,
    {
        let name = name.into();
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let connections: Arc<Mutex<Vec<(TcpStream, JoinHandle<()>)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let accept_thread = {
            let name = name.clone();
            let shutdown = Arc::clone(&shutdown);
            let connections = Arc::clone(&connections);
            thread::Builder::new()
                .name(format!("{}-accept", name))
                .spawn(move || accept_loop(&name, listener, handler, &shutdown, &connections))?
        };

        info!("[Server] {} listening on {}", name, local_addr);
        Ok(Server {
            name,
            local_addr,
            shutdown,
            accept_thread: Some(accept_thread),
            connections,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops accepting, closes live connections and joins every thread
    pub fn stop(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }

        let connections = match self.connections.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for (stream, handle) in connections {
            let _ = stream.shutdown(Shutdown::Both);
            let _ = handle.join();
        }
        info!("[Server] {} stopped", self.name);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop<H>(
    name: &str,
    listener: TcpListener,
    handler: Arc<H>,
    shutdown: &AtomicBool,
    connections: &Mutex<Vec<(TcpStream, JoinHandle<()>)>>,
) where
    H: RequestHandler + 'static,
{
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = spawn_connection(name, stream, peer, &handler, connections) {
                    error!("[Server] {} could not serve {}: {}", name, peer, err);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(err) => {
                warn!("[Server] {} accept failed: {}", name, err);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn spawn_connection<H>(
    name: &str,
    stream: TcpStream,
    peer: SocketAddr,
    handler: &Arc<H>,
    connections: &Mutex<Vec<(TcpStream, JoinHandle<()>)>>,
) -> Result<(), WireError>
where
    H: RequestHandler + 'static,
{
    stream.set_nonblocking(false)?;
    let mut transport = TcpTransport::from_stream(stream)?;
    let control = transport.try_clone_stream()?;
    let handler = Arc::clone(handler);
    let thread_name = format!("{}-conn", name);
    let log_name = name.to_string();

    info!("[Server] {} accepted {}", name, peer);
    let handle = thread::Builder::new().name(thread_name).spawn(move || {
        match serve_connection(&mut transport, &*handler) {
            Ok(()) => debug!("[Server] {} closed connection from {}", log_name, peer),
            Err(err) => warn!("[Server] {} connection from {} failed: {}", log_name, peer, err),
        }
    })?;

    match connections.lock() {
        Ok(mut guard) => guard.push((control, handle)),
        Err(poisoned) => poisoned.into_inner().push((control, handle)),
    }
    Ok(())
}
