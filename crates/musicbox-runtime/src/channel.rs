use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use musicbox_core::{BridgeError, BridgeResult};
use musicbox_types::ConnectionParameters;
use rosc::{OscMessage, OscPacket, OscType};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

pub const RUN_CODE_ADDR: &str = "/run-code";
pub const STOP_ALL_ADDR: &str = "/stop-all-jobs";

/// Command channel into a running engine. Implementations hold whatever
/// addressing state `configure` hands them.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Whether the binding can be used at all on this host.
    fn is_available(&self) -> bool {
        true
    }

    async fn configure(&self, params: &ConnectionParameters) -> BridgeResult<()>;

    async fn run_code(&self, code: &str) -> BridgeResult<()>;

    async fn stop_all(&self) -> BridgeResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OscTarget {
    addr: SocketAddr,
    token: i32,
}

/// Sends OSC messages over UDP to the engine's control port. Every message
/// carries the session token as its first argument.
#[derive(Debug, Default)]
pub struct OscControlChannel {
    target: RwLock<Option<OscTarget>>,
}

impl OscControlChannel {
    pub fn new() -> Self {
        Self::default()
    }

    async fn target(&self) -> BridgeResult<OscTarget> {
        self.target.read().await.ok_or_else(|| {
            BridgeError::ChannelFailure("control channel has not been configured".to_string())
        })
    }

    async fn send(&self, target: OscTarget, packet: &[u8]) -> BridgeResult<()> {
        let bind: SocketAddr = match target.addr.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|err| BridgeError::ChannelFailure(format!("could not open UDP socket: {err}")))?;
        socket.send_to(packet, target.addr).await.map_err(|err| {
            BridgeError::ChannelFailure(format!("send to {} failed: {err}", target.addr))
        })?;
        Ok(())
    }
}

#[async_trait]
impl ControlChannel for OscControlChannel {
    async fn configure(&self, params: &ConnectionParameters) -> BridgeResult<()> {
        let ip: IpAddr = params.address.parse().map_err(|_| {
            BridgeError::ChannelFailure(format!("invalid engine address {}", params.address))
        })?;
        let token = i32::try_from(params.token).map_err(|_| {
            BridgeError::ChannelFailure(format!(
                "token of {} digits does not fit the engine's 32-bit token argument",
                params.token.to_string().len()
            ))
        })?;
        *self.target.write().await = Some(OscTarget {
            addr: SocketAddr::new(ip, params.control_port),
            token,
        });
        Ok(())
    }

    async fn run_code(&self, code: &str) -> BridgeResult<()> {
        let target = self.target().await?;
        let packet = encode_message(
            RUN_CODE_ADDR,
            vec![OscType::Int(target.token), OscType::String(code.to_string())],
        )?;
        self.send(target, &packet).await
    }

    async fn stop_all(&self) -> BridgeResult<()> {
        let target = self.target().await?;
        let packet = encode_message(STOP_ALL_ADDR, vec![OscType::Int(target.token)])?;
        self.send(target, &packet).await
    }
}

fn encode_message(addr: &str, args: Vec<OscType>) -> BridgeResult<Vec<u8>> {
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    rosc::encoder::encode(&packet)
        .map_err(|err| BridgeError::ChannelFailure(format!("could not encode {addr}: {err:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use musicbox_types::LOOPBACK_ADDRESS;
    use std::time::Duration;

    async fn receive_message(socket: &UdpSocket) -> OscMessage {
        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("datagram within timeout")
            .expect("recv");
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).expect("decode");
        match packet {
            OscPacket::Message(msg) => msg,
            other => panic!("expected message, got {other:?}"),
        }
    }

    fn params_for(port: u16, token: i64) -> ConnectionParameters {
        ConnectionParameters {
            address: LOOPBACK_ADDRESS.to_string(),
            control_port: port,
            event_port: port.wrapping_add(1),
            token,
        }
    }

    #[tokio::test]
    async fn run_code_and_stop_carry_the_token() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let channel = OscControlChannel::new();
        channel
            .configure(&params_for(port, 1839204711))
            .await
            .expect("configure");

        channel.run_code("set :reverb_mix, 0.8").await.expect("run");
        let msg = receive_message(&listener).await;
        assert_eq!(msg.addr, RUN_CODE_ADDR);
        assert_eq!(
            msg.args,
            vec![
                OscType::Int(1839204711),
                OscType::String("set :reverb_mix, 0.8".to_string())
            ]
        );

        channel.stop_all().await.expect("stop");
        let msg = receive_message(&listener).await;
        assert_eq!(msg.addr, STOP_ALL_ADDR);
        assert_eq!(msg.args, vec![OscType::Int(1839204711)]);
    }

    #[tokio::test]
    async fn unconfigured_channel_refuses_to_send() {
        let channel = OscControlChannel::new();
        let err = channel.run_code("play 60").await.expect_err("not configured");
        assert_eq!(err.kind(), "channel_failure");
    }

    #[tokio::test]
    async fn oversized_token_is_rejected_at_configure() {
        let channel = OscControlChannel::new();
        let err = channel
            .configure(&params_for(4560, 99_999_999_999))
            .await
            .expect_err("too large");
        assert_eq!(err.kind(), "channel_failure");
    }
}
