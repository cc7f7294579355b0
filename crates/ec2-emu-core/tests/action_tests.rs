use ec2_emu_core::{
    handle_request, EmulatorConfig, Ec2Error, InMemoryStore, InstanceState, RawParameters,
    ResourceKind, ResourceStore, Response,
};

fn setup() -> (InMemoryStore, EmulatorConfig) {
    let config = EmulatorConfig::default();
    (InMemoryStore::new(config.clone()), config)
}

fn call(store: &InMemoryStore, config: &EmulatorConfig, body: &str) -> ec2_emu_core::Result<Response> {
    let raw: RawParameters = body.parse()?;
    handle_request(store, config, &raw)
}

fn run(store: &InMemoryStore, config: &EmulatorConfig, count: u32) {
    call(
        store,
        config,
        &format!("Action=RunInstances&ImageId=ami-1234abcd&MinCount={count}&MaxCount={count}"),
    )
    .unwrap();
}

// ============================================================================
// Routing
// ============================================================================

#[test]
fn missing_action_is_missing_parameter() {
    let (store, config) = setup();
    assert_eq!(
        call(&store, &config, "InstanceId.1=i-1"),
        Err(Ec2Error::MissingParameter("Action".into()))
    );
}

#[test]
fn unknown_action_is_invalid_action() {
    let (store, config) = setup();
    assert_eq!(
        call(&store, &config, "Action=CreateVpc"),
        Err(Ec2Error::InvalidAction("CreateVpc".into()))
    );
}

#[test]
fn state_changes_require_instance_ids() {
    let (store, config) = setup();
    for action in ["TerminateInstances", "StopInstances", "StartInstances", "RebootInstances"] {
        assert_eq!(
            call(&store, &config, &format!("Action={action}")),
            Err(Ec2Error::MissingParameter("InstanceId".into())),
            "{action}"
        );
    }
}

// ============================================================================
// RunInstances / DescribeInstances
// ============================================================================

#[test]
fn run_instances_reports_pending() {
    let (store, config) = setup();
    let response = call(
        &store,
        &config,
        "Action=RunInstances&ImageId=ami-1234abcd&MinCount=2&MaxCount=2",
    )
    .unwrap();
    let Response::RunInstances { reservation, request_id } = response else {
        panic!("expected RunInstances response");
    };
    assert_eq!(request_id, config.placeholders.request_id);
    assert_eq!(reservation.instances.len(), 2);
    for (index, instance) in reservation.instances.iter().enumerate() {
        assert_eq!(instance.state.name, "pending");
        assert_eq!(instance.ami_launch_index, index);
        assert_eq!(instance.block_devices[0].device_name, "/dev/sda1");
    }
    // The store itself holds them as running.
    assert!(store
        .all_instances()
        .iter()
        .all(|i| i.state == InstanceState::Running));
}

#[test]
fn describe_all_then_by_id() {
    let (store, config) = setup();
    run(&store, &config, 1);
    run(&store, &config, 2);

    let Response::DescribeInstances { reservations, .. } =
        call(&store, &config, "Action=DescribeInstances").unwrap()
    else {
        panic!("expected DescribeInstances response");
    };
    assert_eq!(reservations.len(), 2);

    let Response::DescribeInstances { reservations, .. } = call(
        &store,
        &config,
        "Action=DescribeInstances&InstanceId.1=i-00000003",
    )
    .unwrap() else {
        panic!("expected DescribeInstances response");
    };
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].reservation_id, "r-00000002");
    assert_eq!(reservations[0].instances[0].instance_id, "i-00000003");
    assert_eq!(reservations[0].instances[0].state.name, "running");
}

#[test]
fn filters_narrow_id_selection_never_expand() {
    let (store, config) = setup();
    run(&store, &config, 2);
    let body = "Action=DescribeInstances&InstanceId.1=i-00000001\
                &Filter.1.Name=instance-state-name&Filter.1.Value.1=running";
    let Response::DescribeInstances { reservations, .. } = call(&store, &config, body).unwrap()
    else {
        panic!("expected DescribeInstances response");
    };
    let ids: Vec<_> = reservations
        .iter()
        .flat_map(|r| r.instances.iter().map(|i| i.instance_id.as_str()))
        .collect();
    assert_eq!(ids, vec!["i-00000001"]);
}

#[test]
fn describe_unknown_id_is_not_found() {
    let (store, config) = setup();
    assert_eq!(
        call(&store, &config, "Action=DescribeInstances&InstanceId.1=i-nope"),
        Err(Ec2Error::not_found(ResourceKind::Instance, "i-nope"))
    );
}

#[test]
fn describe_unsupported_filter_on_empty_store() {
    let (store, config) = setup();
    assert_eq!(
        call(
            &store,
            &config,
            "Action=DescribeInstances&Filter.1.Name=flavor&Filter.1.Value.1=x"
        ),
        Err(Ec2Error::UnsupportedFilter("flavor".into()))
    );
}

// ============================================================================
// Lifecycle actions
// ============================================================================

#[test]
fn terminate_reports_previous_and_current() {
    let (store, config) = setup();
    run(&store, &config, 1);
    let Response::TerminateInstances { instances, .. } = call(
        &store,
        &config,
        "Action=TerminateInstances&InstanceId.1=i-00000001",
    )
    .unwrap() else {
        panic!("expected TerminateInstances response");
    };
    assert_eq!(instances[0].previous_state.name, "running");
    assert_eq!(instances[0].current_state.code, 48);
}

#[test]
fn stop_then_start() {
    let (store, config) = setup();
    run(&store, &config, 1);
    let stop = call(&store, &config, "Action=StopInstances&InstanceId.1=i-00000001").unwrap();
    assert_eq!(stop.action(), "StopInstances");
    let Response::StartInstances { instances, .. } =
        call(&store, &config, "Action=StartInstances&InstanceId.1=i-00000001").unwrap()
    else {
        panic!("expected StartInstances response");
    };
    assert_eq!(instances[0].previous_state.name, "stopped");
    assert_eq!(instances[0].current_state.name, "running");
}

#[test]
fn reboot_answers_without_instances() {
    let (store, config) = setup();
    run(&store, &config, 1);
    let response = call(&store, &config, "Action=RebootInstances&InstanceId.1=i-00000001").unwrap();
    assert!(matches!(response, Response::RebootInstances { .. }));
}

// ============================================================================
// Status and attributes
// ============================================================================

#[test]
fn instance_status_follows_state() {
    let (store, config) = setup();
    run(&store, &config, 2);
    call(&store, &config, "Action=StopInstances&InstanceId.1=i-00000002").unwrap();

    let Response::DescribeInstanceStatus { statuses, .. } =
        call(&store, &config, "Action=DescribeInstanceStatus").unwrap()
    else {
        panic!("expected DescribeInstanceStatus response");
    };
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].system_status, "ok");
    assert_eq!(statuses[1].state.name, "stopped");
    assert_eq!(statuses[1].instance_status, "not-applicable");

    let Response::DescribeInstanceStatus { statuses, .. } = call(
        &store,
        &config,
        "Action=DescribeInstanceStatus&Filter.1.Name=instance-state-name&Filter.1.Value.1=stopped",
    )
    .unwrap() else {
        panic!("expected DescribeInstanceStatus response");
    };
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].instance_id, "i-00000002");
}

#[test]
fn describe_attribute_echoes_requested_name() {
    let (store, config) = setup();
    run(&store, &config, 1);
    let Response::DescribeInstanceAttribute { attribute, .. } = call(
        &store,
        &config,
        "Action=DescribeInstanceAttribute&InstanceId=i-00000001&Attribute=instanceType",
    )
    .unwrap() else {
        panic!("expected DescribeInstanceAttribute response");
    };
    assert_eq!(attribute.attribute, "instanceType");
    assert_eq!(attribute.value, "m1.small");
}

#[test]
fn describe_attribute_requires_attribute() {
    let (store, config) = setup();
    run(&store, &config, 1);
    assert_eq!(
        call(&store, &config, "Action=DescribeInstanceAttribute&InstanceId=i-00000001"),
        Err(Ec2Error::MissingParameter("Attribute".into()))
    );
}

#[test]
fn describe_attribute_rejects_names_that_are_not_identifiers() {
    let (store, config) = setup();
    run(&store, &config, 1);
    for attribute in ["Instance%20Type", "instance_type", "1type", "a%3Cb"] {
        let body = format!(
            "Action=DescribeInstanceAttribute&InstanceId=i-00000001&Attribute={attribute}"
        );
        let err = call(&store, &config, &body).unwrap_err();
        assert!(matches!(err, Ec2Error::InvalidParameterValue { .. }), "{attribute}");
    }
}

#[test]
fn modify_then_describe_attribute() {
    let (store, config) = setup();
    run(&store, &config, 1);
    let response = call(
        &store,
        &config,
        "Action=ModifyInstanceAttribute&InstanceId=i-00000001&InstanceType.Value=m1.large",
    )
    .unwrap();
    assert_eq!(response.action(), "ModifyInstanceAttribute");

    let Response::DescribeInstanceAttribute { attribute, .. } = call(
        &store,
        &config,
        "Action=DescribeInstanceAttribute&InstanceId=i-00000001&Attribute=instanceType",
    )
    .unwrap() else {
        panic!("expected DescribeInstanceAttribute response");
    };
    assert_eq!(attribute.value, "m1.large");
}

#[test]
fn modify_without_recognized_shape_is_not_implemented() {
    let (store, config) = setup();
    run(&store, &config, 1);
    let err = call(
        &store,
        &config,
        "Action=ModifyInstanceAttribute&InstanceId=i-00000001&Attribute=kernel",
    )
    .unwrap_err();
    assert_eq!(err.code(), "NotImplemented");
}

#[test]
fn responses_serialize_with_action_tag() {
    let (store, config) = setup();
    run(&store, &config, 1);
    let response = call(&store, &config, "Action=DescribeInstances").unwrap();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["action"], "DescribeInstances");
    assert_eq!(
        json["reservations"][0]["instances"][0]["instance_id"],
        "i-00000001"
    );
}
