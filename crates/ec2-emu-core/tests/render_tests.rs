use ec2_emu_core::{
    handle_request, render_error, render_response, EmulatorConfig, Ec2Error, InMemoryStore,
    RawParameters, ResourceKind,
};

fn xml_for(store: &InMemoryStore, config: &EmulatorConfig, body: &str) -> String {
    let raw: RawParameters = body.parse().unwrap();
    render_response(&handle_request(store, config, &raw).unwrap())
}

fn launched() -> (InMemoryStore, EmulatorConfig) {
    let config = EmulatorConfig::default();
    let store = InMemoryStore::new(config.clone());
    xml_for(
        &store,
        &config,
        "Action=RunInstances&ImageId=ami-1234abcd&SubnetId=subnet-1a2b3c4d&AssociatePublicIpAddress=true",
    );
    (store, config)
}

// ============================================================================
// Success documents
// ============================================================================

#[test]
fn run_instances_document() {
    let config = EmulatorConfig::default();
    let store = InMemoryStore::new(config.clone());
    let xml = xml_for(
        &store,
        &config,
        "Action=RunInstances&ImageId=ami-1234abcd&MinCount=1&MaxCount=1&KeyName=deploy",
    );
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
    assert!(xml.contains(
        "<RunInstancesResponse xmlns=\"http://ec2.amazonaws.com/doc/2012-12-01/\">"
    ));
    assert!(xml.contains("<requestId>59dbff89-35bd-4eac-99ed-be587EXAMPLE</requestId>"));
    assert!(xml.contains("<reservationId>r-00000001</reservationId>"));
    assert!(xml.contains("<ownerId>111122223333</ownerId>"));
    assert!(xml.contains("<code>0</code>"));
    assert!(xml.contains("<name>pending</name>"));
    assert!(xml.contains("<keyName>deploy</keyName>"));
    assert!(xml.contains("<deviceName>/dev/sda1</deviceName>"));
    assert!(xml.contains("<networkInterfaceSet/>"));
    assert!(xml.trim_end().ends_with("</RunInstancesResponse>"));
}

#[test]
fn describe_instances_document() {
    let (store, config) = launched();
    let xml = xml_for(&store, &config, "Action=DescribeInstances");
    assert!(xml.contains("<reservationSet>"));
    assert!(xml.contains("<instanceId>i-00000001</instanceId>"));
    assert!(xml.contains("<name>running</name>"));
    assert!(xml.contains("<subnetId>subnet-1a2b3c4d</subnetId>"));
    assert!(xml.contains("<vpcId>vpc-1a2b3c4d</vpcId>"));
    assert!(xml.contains("<privateIpAddress>10.0.0.4</privateIpAddress>"));
    assert!(xml.contains("<ipAddress>46.51.219.63</ipAddress>"));
    assert!(xml.contains("<publicIp>46.51.219.63</publicIp>"));
    assert!(xml.contains("<description>Primary network interface</description>"));
    assert!(xml.contains("<groupName>default</groupName>"));
    assert!(xml.contains("<keyName/>"));
}

#[test]
fn empty_describe_renders_empty_set() {
    let config = EmulatorConfig::default();
    let store = InMemoryStore::new(config.clone());
    let xml = xml_for(&store, &config, "Action=DescribeInstances");
    assert!(xml.contains("<reservationSet/>"));
}

#[test]
fn state_change_document() {
    let (store, config) = launched();
    let xml = xml_for(&store, &config, "Action=StopInstances&InstanceId.1=i-00000001");
    let previous = xml.find("<previousState>").unwrap();
    let current = xml.find("<currentState>").unwrap();
    assert!(previous < current);
    assert!(xml[previous..current].contains("<name>running</name>"));
    assert!(xml[current..].contains("<code>80</code>"));
}

#[test]
fn reboot_and_modify_return_true() {
    let (store, config) = launched();
    let reboot = xml_for(&store, &config, "Action=RebootInstances&InstanceId.1=i-00000001");
    assert!(reboot.contains("<return>true</return>"));
    let modify = xml_for(
        &store,
        &config,
        "Action=ModifyInstanceAttribute&InstanceId=i-00000001&Kernel.Value=aki-1",
    );
    assert!(modify.contains("<ModifyInstanceAttributeResponse"));
    assert!(modify.contains("<return>true</return>"));
}

#[test]
fn attribute_document_uses_requested_element() {
    let (store, config) = launched();
    let xml = xml_for(
        &store,
        &config,
        "Action=DescribeInstanceAttribute&InstanceId=i-00000001&Attribute=instanceType",
    );
    assert!(xml.contains("<instanceType>\n"));
    assert!(xml.contains("<value>m1.small</value>"));
}

#[test]
fn status_document_uses_later_namespace() {
    let (store, config) = launched();
    let xml = xml_for(&store, &config, "Action=DescribeInstanceStatus");
    assert!(xml.contains("xmlns=\"http://ec2.amazonaws.com/doc/2014-05-01/\""));
    assert!(xml.contains("<systemStatus>"));
    assert!(xml.contains("<status>ok</status>"));
    assert!(xml.contains("<status>passed</status>"));
}

#[test]
fn text_is_escaped() {
    let config = EmulatorConfig::default();
    let store = InMemoryStore::new(config.clone());
    let xml = xml_for(
        &store,
        &config,
        "Action=RunInstances&ImageId=ami-1&KeyName=a%3Cb%26c",
    );
    assert!(xml.contains("<keyName>a&lt;b&amp;c</keyName>"));
}

// ============================================================================
// Error envelope
// ============================================================================

#[test]
fn error_envelope_shape() {
    let xml = render_error(
        &Ec2Error::not_found(ResourceKind::Instance, "i-nope"),
        "req-42",
    );
    let expected = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                    <Response>\n  \
                    <Errors>\n    \
                    <Error>\n      \
                    <Code>InvalidInstanceID.NotFound</Code>\n      \
                    <Message>The instance ID &apos;i-nope&apos; does not exist</Message>\n    \
                    </Error>\n  \
                    </Errors>\n  \
                    <RequestID>req-42</RequestID>\n\
                    </Response>\n";
    assert_eq!(xml, expected);
}

#[test]
fn not_implemented_envelope() {
    let xml = render_error(
        &Ec2Error::UnsupportedOperation(
            "This specific call to ModifyInstanceAttribute has not been implemented".into(),
        ),
        "req-1",
    );
    assert!(xml.contains("<Code>NotImplemented</Code>"));
}
