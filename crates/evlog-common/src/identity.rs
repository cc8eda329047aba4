//! Process identity: host and image fields merged into every event, plus the
//! application name used for index and file naming.

use std::env;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::event::Fields;

/// Identity fields discovered once at logger construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub server_name: String,
    pub server_ip: String,
    pub image_name: String,
    pub image_tag: String,
}

impl Identity {
    /// Discover identity from the OS and the container environment.
    pub fn discover() -> Self {
        let server_name = os_hostname()
            .or_else(|| non_empty_env("HOSTNAME"))
            .unwrap_or_default();
        let server_ip = pick_server_ip(interface_ipv4s())
            .map(|ip| ip.to_string())
            .unwrap_or_default();
        Identity {
            server_name,
            server_ip,
            image_name: non_empty_env("DOCKER_IMAGE_NAME").unwrap_or_default(),
            image_tag: non_empty_env("DOCKER_IMAGE_TAG").unwrap_or_default(),
        }
    }

    /// Non-empty identity values under their wire names.
    pub fn fields(&self) -> Fields {
        let mut fields = Fields::with_capacity(4);
        for (key, value) in [
            ("serverName", &self.server_name),
            ("serverIp", &self.server_ip),
            ("imageName", &self.image_name),
            ("imageTag", &self.image_tag),
        ] {
            if !value.is_empty() {
                fields.insert(key, value.as_str());
            }
        }
        fields
    }
}

/// Resolve the application name.
///
/// Order: `DISCOVER_APP`, `discover_app`, the image name from
/// `DOCKER_IMAGE_NAME`, then the executable's file name.
pub fn resolve_app_name() -> String {
    if let Some(name) = non_empty_env("DISCOVER_APP").or_else(|| non_empty_env("discover_app")) {
        return name;
    }
    if let Some(image) = non_empty_env("DOCKER_IMAGE_NAME") {
        let name = app_name_from_image(&image);
        if !name.is_empty() {
            return name;
        }
    }
    env::args()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `registry.example.com/team/orders-api:1.4#42` becomes `orders-api`.
pub fn app_name_from_image(image: &str) -> String {
    let last = image.rsplit('/').next().unwrap_or(image);
    let last = last.split('#').next().unwrap_or(last);
    let last = last.split(':').next().unwrap_or(last);
    last.trim().to_string()
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First usable IPv4 address: not loopback, link-local, multicast, or on
/// the default Docker bridge (`172.17.0.0/16`).
pub fn pick_server_ip(addrs: impl IntoIterator<Item = Ipv4Addr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find(|ip| {
        !(ip.is_loopback()
            || ip.is_unspecified()
            || ip.is_link_local()
            || ip.is_multicast()
            || ip.is_broadcast()
            || ip.octets()[..2] == [172, 17])
    })
}

#[cfg(unix)]
fn interface_ipv4s() -> Vec<Ipv4Addr> {
    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    // SAFETY: head is a valid out-pointer; the list is freed below on success.
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        return Vec::new();
    }
    let mut addrs = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        // SAFETY: cursor walks the list returned by getifaddrs, which is still live.
        let entry = unsafe { &*cursor };
        if !entry.ifa_addr.is_null() {
            // SAFETY: ifa_addr is non-null and owned by the list.
            let family = unsafe { (*entry.ifa_addr).sa_family };
            if i32::from(family) == libc::AF_INET {
                // SAFETY: an AF_INET address is laid out as sockaddr_in.
                let sin = unsafe { &*entry.ifa_addr.cast::<libc::sockaddr_in>() };
                addrs.push(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)));
            }
        }
        cursor = entry.ifa_next;
    }
    // SAFETY: head came from a successful getifaddrs and is freed exactly once.
    unsafe { libc::freeifaddrs(head) };
    addrs
}

#[cfg(not(unix))]
fn interface_ipv4s() -> Vec<Ipv4Addr> {
    Vec::new()
}

#[cfg(unix)]
fn os_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for writes of buf.len() bytes and outlives the call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    (!name.is_empty()).then_some(name)
}

#[cfg(not(unix))]
fn os_hostname() -> Option<String> {
    None
}
