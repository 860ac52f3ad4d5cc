//! Wake-on-LAN magic packets

use powerward_host_api::MacAddress;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::debug;

/// 6 bytes of 0xFF followed by the MAC repeated 16 times
pub const MAGIC_PACKET_LEN: usize = 6 + 16 * 6;

pub fn magic_packet(mac: &MacAddress) -> [u8; MAGIC_PACKET_LEN] {
    let mut packet = [0xFFu8; MAGIC_PACKET_LEN];
    let octets = mac.octets();
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&octets);
    }
    packet
}

/// Send one magic packet to `target`, usually a broadcast address on port 9
pub async fn send_magic_packet(mac: &MacAddress, target: SocketAddr) -> std::io::Result<()> {
    let bind: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(bind).await?;
    socket.set_broadcast(true)?;
    let sent = socket.send_to(&magic_packet(mac), target).await?;
    debug!(%mac, %target, bytes = sent, "Magic packet sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_layout() {
        let mac = MacAddress::new([0x00, 0x1b, 0x21, 0xaa, 0xbb, 0xcc]);
        let packet = magic_packet(&mac);

        assert_eq!(packet.len(), 102);
        assert_eq!(&packet[..6], &[0xFF; 6]);
        for i in 0..16 {
            let start = 6 + i * 6;
            assert_eq!(&packet[start..start + 6], &mac.octets());
        }
    }

    #[tokio::test]
    async fn packet_arrives_over_udp() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();
        let mac = MacAddress::new([1, 2, 3, 4, 5, 6]);

        send_magic_packet(&mac, target).await.unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &magic_packet(&mac)[..]);
    }
}
