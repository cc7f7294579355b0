//! Wire rendering of assembled responses into the provider's XML syntax.
//!
//! Output is built by walking the views and appending to a `String`, two
//! spaces of indentation per nesting level. Element names and nesting follow
//! the provider's `2012-12-01` schema (instance status uses `2014-05-01`);
//! list containers use `<item>` children. Text content is escaped.

use crate::error::Ec2Error;
use crate::response::{
    BlockDeviceView, GroupView, InstanceStatusView, InstanceView, NetworkInterfaceView,
    ReservationView, Response, StateChangeView, StateView,
};

/// Namespace of the instance response documents.
pub const XMLNS: &str = "http://ec2.amazonaws.com/doc/2012-12-01/";

/// `DescribeInstanceStatus` is answered from a later schema revision.
pub const STATUS_XMLNS: &str = "http://ec2.amazonaws.com/doc/2014-05-01/";

/// Render a success response document.
pub fn render_response(response: &Response) -> String {
    let mut xml = Xml::new();
    let root = format!("{}Response", response.action());
    let ns = match response {
        Response::DescribeInstanceStatus { .. } => STATUS_XMLNS,
        _ => XMLNS,
    };
    xml.declaration();
    xml.open_with_ns(&root, ns);
    xml.leaf("requestId", response.request_id());

    match response {
        Response::DescribeInstances { reservations, .. } => {
            xml.list("reservationSet", reservations, render_reservation);
        }
        Response::RunInstances { reservation, .. } => {
            render_reservation(&mut xml, reservation);
        }
        Response::TerminateInstances { instances, .. }
        | Response::StopInstances { instances, .. }
        | Response::StartInstances { instances, .. } => {
            xml.list("instancesSet", instances, render_state_change);
        }
        Response::RebootInstances { .. } => {
            xml.leaf("return", "true");
        }
        Response::DescribeInstanceStatus { statuses, .. } => {
            xml.list("instanceStatusSet", statuses, render_status);
        }
        Response::DescribeInstanceAttribute { attribute, .. } => {
            xml.leaf("instanceId", &attribute.instance_id);
            xml.open(&attribute.attribute);
            xml.leaf("value", &attribute.value);
            xml.close(&attribute.attribute);
        }
        Response::ModifyInstanceAttribute { .. } => {
            xml.leaf("return", "true");
        }
    }

    xml.close(&root);
    xml.finish()
}

/// Render the provider's error envelope.
pub fn render_error(error: &Ec2Error, request_id: &str) -> String {
    let mut xml = Xml::new();
    xml.declaration();
    xml.open("Response");
    xml.open("Errors");
    xml.open("Error");
    xml.leaf("Code", error.code());
    xml.leaf("Message", &error.to_string());
    xml.close("Error");
    xml.close("Errors");
    xml.leaf("RequestID", request_id);
    xml.close("Response");
    xml.finish()
}

fn render_reservation(xml: &mut Xml, reservation: &ReservationView) {
    xml.leaf("reservationId", &reservation.reservation_id);
    xml.leaf("ownerId", &reservation.owner_id);
    xml.list("groupSet", &reservation.groups, render_group);
    xml.list("instancesSet", &reservation.instances, render_instance);
}

fn render_instance(xml: &mut Xml, instance: &InstanceView) {
    xml.leaf("instanceId", &instance.instance_id);
    xml.leaf("imageId", &instance.image_id);
    render_state(xml, "instanceState", &instance.state);
    xml.leaf("privateDnsName", &instance.private_dns_name);
    xml.leaf("dnsName", &instance.dns_name);
    xml.empty("reason");
    xml.leaf_opt("keyName", instance.key_name.as_deref());
    xml.leaf("amiLaunchIndex", &instance.ami_launch_index.to_string());
    xml.empty("productCodes");
    xml.leaf("instanceType", &instance.instance_type);
    xml.leaf("launchTime", &instance.launch_time);
    xml.open("placement");
    xml.leaf("availabilityZone", &instance.availability_zone);
    xml.empty("groupName");
    xml.leaf("tenancy", &instance.tenancy);
    xml.close("placement");
    if let Some(platform) = &instance.platform {
        xml.leaf("platform", platform);
    }
    xml.open("monitoring");
    xml.leaf("state", &instance.monitoring_state);
    xml.close("monitoring");
    if let Some(subnet_id) = &instance.subnet_id {
        xml.leaf("subnetId", subnet_id);
    }
    if let Some(vpc_id) = &instance.vpc_id {
        xml.leaf("vpcId", vpc_id);
    }
    if let Some(ip) = &instance.private_ip_address {
        xml.leaf("privateIpAddress", ip);
    }
    if let Some(ip) = &instance.ip_address {
        xml.leaf("ipAddress", ip);
    }
    xml.leaf("sourceDestCheck", bool_str(instance.source_dest_check));
    xml.list("groupSet", &instance.groups, render_group);
    xml.leaf("architecture", &instance.architecture);
    xml.leaf("kernelId", &instance.kernel_id);
    xml.leaf("rootDeviceType", instance.root_device_type);
    xml.leaf("rootDeviceName", &instance.root_device_name);
    xml.list("blockDeviceMapping", &instance.block_devices, render_block_device);
    xml.leaf("virtualizationType", &instance.virtualization_type);
    xml.leaf("clientToken", &instance.client_token);
    xml.list("tagSet", &instance.tags, |xml, tag| {
        xml.leaf("resourceId", &tag.resource_id);
        xml.leaf("resourceType", tag.resource_type);
        xml.leaf("key", &tag.key);
        xml.leaf("value", &tag.value);
    });
    xml.leaf("hypervisor", &instance.hypervisor);
    xml.leaf("ebsOptimized", bool_str(instance.ebs_optimized));
    xml.list("networkInterfaceSet", &instance.network_interfaces, render_nic);
}

fn render_nic(xml: &mut Xml, nic: &NetworkInterfaceView) {
    xml.leaf("networkInterfaceId", &nic.network_interface_id);
    xml.leaf("subnetId", &nic.subnet_id);
    xml.leaf("vpcId", &nic.vpc_id);
    xml.leaf("description", &nic.description);
    xml.leaf("ownerId", &nic.owner_id);
    xml.leaf("status", nic.status);
    xml.leaf("macAddress", &nic.mac_address);
    xml.leaf("privateIpAddress", &nic.private_ip_address);
    xml.leaf("sourceDestCheck", bool_str(nic.source_dest_check));
    xml.list("groupSet", &nic.groups, render_group);
    xml.open("attachment");
    xml.leaf("attachmentId", &nic.attachment_id);
    xml.leaf("deviceIndex", &nic.device_index.to_string());
    xml.leaf("status", nic.attachment_status);
    xml.leaf("deleteOnTermination", bool_str(nic.delete_on_termination));
    xml.close("attachment");
    if let Some(public_ip) = &nic.public_ip {
        render_association(xml, public_ip, &nic.owner_id);
    }
    xml.open("privateIpAddressesSet");
    xml.open("item");
    xml.leaf("privateIpAddress", &nic.private_ip_address);
    xml.leaf("primary", "true");
    if let Some(public_ip) = &nic.public_ip {
        render_association(xml, public_ip, &nic.owner_id);
    }
    xml.close("item");
    xml.close("privateIpAddressesSet");
}

fn render_association(xml: &mut Xml, public_ip: &str, owner_id: &str) {
    xml.open("association");
    xml.leaf("publicIp", public_ip);
    xml.leaf("ipOwnerId", owner_id);
    xml.close("association");
}

fn render_block_device(xml: &mut Xml, device: &BlockDeviceView) {
    xml.leaf("deviceName", &device.device_name);
    xml.open("ebs");
    xml.leaf("volumeId", &device.volume_id);
    xml.leaf("status", &device.status);
    xml.leaf("attachTime", &device.attach_time);
    xml.leaf("deleteOnTermination", bool_str(device.delete_on_termination));
    xml.close("ebs");
}

fn render_group(xml: &mut Xml, group: &GroupView) {
    xml.leaf("groupId", &group.group_id);
    xml.leaf("groupName", &group.group_name);
}

fn render_state(xml: &mut Xml, tag: &str, state: &StateView) {
    xml.open(tag);
    xml.leaf("code", &state.code.to_string());
    xml.leaf("name", state.name);
    xml.close(tag);
}

fn render_state_change(xml: &mut Xml, change: &StateChangeView) {
    xml.leaf("instanceId", &change.instance_id);
    render_state(xml, "previousState", &change.previous_state);
    render_state(xml, "currentState", &change.current_state);
}

fn render_status(xml: &mut Xml, status: &InstanceStatusView) {
    xml.leaf("instanceId", &status.instance_id);
    xml.leaf("availabilityZone", &status.availability_zone);
    render_state(xml, "instanceState", &status.state);
    for (tag, value) in [
        ("systemStatus", status.system_status),
        ("instanceStatus", status.instance_status),
    ] {
        xml.open(tag);
        xml.leaf("status", value);
        xml.open("details");
        xml.open("item");
        xml.leaf("name", "reachability");
        xml.leaf("status", if value == "ok" { "passed" } else { "initializing" });
        xml.close("item");
        xml.close("details");
        xml.close(tag);
    }
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Minimal indenting XML emitter.
struct Xml {
    out: String,
    depth: usize,
}

impl Xml {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn declaration(&mut self) {
        self.out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn open(&mut self, tag: &str) {
        self.indent();
        self.out.push_str(&format!("<{tag}>\n"));
        self.depth += 1;
    }

    fn open_with_ns(&mut self, tag: &str, ns: &str) {
        self.indent();
        self.out.push_str(&format!("<{tag} xmlns=\"{ns}\">\n"));
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str(&format!("</{tag}>\n"));
    }

    fn leaf(&mut self, tag: &str, text: &str) {
        self.indent();
        self.out.push_str(&format!("<{tag}>"));
        escape_into(text, &mut self.out);
        self.out.push_str(&format!("</{tag}>\n"));
    }

    fn leaf_opt(&mut self, tag: &str, text: Option<&str>) {
        match text {
            Some(text) => self.leaf(tag, text),
            None => self.empty(tag),
        }
    }

    fn empty(&mut self, tag: &str) {
        self.indent();
        self.out.push_str(&format!("<{tag}/>\n"));
    }

    /// `<tag><item>…</item>…</tag>`, one `item` per element.
    fn list<T>(&mut self, tag: &str, items: &[T], mut each: impl FnMut(&mut Self, &T)) {
        if items.is_empty() {
            self.empty(tag);
            return;
        }
        self.open(tag);
        for item in items {
            self.open("item");
            each(self, item);
            self.close("item");
        }
        self.close(tag);
    }

    fn finish(self) -> String {
        self.out
    }
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_text_content() {
        let mut out = String::new();
        escape_into("a<b & 'c'", &mut out);
        assert_eq!(out, "a&lt;b &amp; &apos;c&apos;");
    }

    #[test]
    fn empty_list_renders_self_closing() {
        let mut xml = Xml::new();
        xml.list::<GroupView>("groupSet", &[], render_group);
        assert_eq!(xml.finish(), "<groupSet/>\n");
    }

    #[test]
    fn error_envelope_carries_code() {
        let xml = render_error(&Ec2Error::UnsupportedFilter("foo".into()), "req-1");
        assert!(xml.contains("<Code>InvalidParameterValue</Code>"));
        assert!(xml.contains("The filter &apos;foo&apos; is not supported"));
        assert!(xml.contains("<RequestID>req-1</RequestID>"));
    }
}
