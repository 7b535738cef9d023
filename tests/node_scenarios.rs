use std::time::Duration;

use common::{
    DeviceType, Envelope, KeepAlive, Payload, PayloadKind, PeerAddress, SetCommand, SwitchState,
    ENVELOPE_LEN,
};
use espnow_light::prelude::*;
use tokio::time::Instant;

const NODE: PeerAddress = PeerAddress::new([0x5c, 0xcf, 0x7f, 0x01, 0x02, 0x03]);
const GATEWAY_A: PeerAddress = PeerAddress::new([0x24, 0x6f, 0x28, 0, 0, 0xa]);
const GATEWAY_B: PeerAddress = PeerAddress::new([0x24, 0x6f, 0x28, 0, 0, 0xb]);

#[derive(Default)]
struct MockTransport {
    next_id: SequenceId,
    sent: Vec<(SequenceId, Envelope, PeerAddress)>,
    maintenance_calls: usize,
}

impl MockTransport {
    fn kinds(&self) -> Vec<PayloadKind> {
        self.sent.iter().map(|(_, envelope, _)| envelope.kind()).collect()
    }
}

impl MeshTransport for MockTransport {
    fn local_address(&self) -> PeerAddress {
        NODE
    }

    fn send_unicast(&mut self, frame: &[u8; ENVELOPE_LEN], destination: PeerAddress) -> SequenceId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let envelope = Envelope::decode(frame).unwrap();
        self.sent.push((id, envelope, destination));
        id
    }

    fn maintenance(&mut self) {
        self.maintenance_calls += 1;
    }
}

type TestNode = LightNode<MockTransport, RecordingDriver, MemoryStore>;

fn config(profile: ChannelProfile) -> NodeConfig {
    NodeConfig {
        device_name: "Test light".to_string(),
        profile,
        ..Default::default()
    }
}

fn boot(profile: ChannelProfile, store: MemoryStore, now: Instant) -> TestNode {
    LightNode::new(
        &config(profile),
        MockTransport::default(),
        RecordingDriver::default(),
        store,
        now,
    )
}

fn frame(sender: PeerAddress, delivery: Delivery, device_type: DeviceType, payload: Payload) -> InboundFrame {
    InboundFrame {
        sender,
        delivery,
        bytes: Envelope::new(device_type, payload).encode().unwrap().to_vec(),
    }
}

fn keep_alive(sender: PeerAddress, bridge_online: bool) -> InboundFrame {
    frame(
        sender,
        Delivery::Broadcast,
        DeviceType::Gateway,
        Payload::KeepAlive(KeepAlive::from_gateway(bridge_online)),
    )
}

fn set(sender: PeerAddress, command: SetCommand) -> InboundFrame {
    frame(sender, Delivery::Unicast, DeviceType::Gateway, Payload::Set(command))
}

fn bound_node(profile: ChannelProfile, now: Instant) -> TestNode {
    let mut node = boot(profile, MemoryStore::default(), now);
    assert_eq!(node.handle_frame(&keep_alive(GATEWAY_A, false), now), None);
    node
}

#[test]
fn boot_restores_and_drives_saved_state() {
    let saved = DeviceState {
        power: true,
        brightness: 255,
        color_temperature: 153,
        red: 255,
        green: 255,
        blue: 255,
    };
    let node = boot(
        ChannelProfile::ColdAndWarmWhite,
        MemoryStore::with_state(saved),
        Instant::now(),
    );

    assert_eq!(*node.state(), saved);
    assert_eq!(node.driver().last(Channel::ColdWhite), Some(255));
    assert_eq!(node.driver().last(Channel::WarmWhite), Some(0));
    assert_eq!(node.store().saves, 1);
}

#[test]
fn keep_alive_binds_first_gateway_and_ignores_the_next() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, now);
    assert_eq!(node.presence().bound_gateway(), Some(GATEWAY_A));

    node.handle_frame(&keep_alive(GATEWAY_B, true), now);
    assert_eq!(node.presence().bound_gateway(), Some(GATEWAY_A));
    assert!(node.delivery().transport().sent.is_empty());
}

#[test]
fn nothing_is_sent_while_unbound() {
    let now = Instant::now();
    let mut node = boot(ChannelProfile::Rgb, MemoryStore::default(), now);

    node.advance(now);
    node.poll(now);
    assert!(node.delivery().transport().sent.is_empty());
    assert_eq!(node.delivery().transport().maintenance_calls, 1);

    // Flags were consumed, so binding does not release a backlog
    node.handle_frame(&keep_alive(GATEWAY_A, false), now);
    node.poll(now);
    assert!(node.delivery().transport().sent.is_empty());
}

#[test]
fn periodic_announcements_go_to_the_gateway() {
    let start = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, start);

    node.advance(start);
    node.poll(start);
    assert_eq!(
        node.delivery().transport().kinds(),
        vec![PayloadKind::Attributes, PayloadKind::KeepAlive, PayloadKind::State]
    );
    assert!(node
        .delivery()
        .transport()
        .sent
        .iter()
        .all(|(_, envelope, destination)| *destination == GATEWAY_A
            && envelope.device_type == DeviceType::Led));

    let later = start + Duration::from_secs(10);
    node.handle_frame(&keep_alive(GATEWAY_A, false), later);
    node.advance(later);
    node.poll(later);
    assert_eq!(
        node.delivery().transport().kinds().last(),
        Some(&PayloadKind::KeepAlive)
    );
    assert_eq!(node.delivery().transport().sent.len(), 4);
}

#[test]
fn bridge_coming_online_resends_config_attributes_and_state_once() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::RgbPlusColdAndWarmWhite, now);

    node.handle_frame(&keep_alive(GATEWAY_A, true), now);
    assert_eq!(
        node.delivery().transport().kinds(),
        vec![PayloadKind::Config, PayloadKind::Attributes, PayloadKind::State]
    );

    node.handle_frame(&keep_alive(GATEWAY_A, true), now);
    assert_eq!(node.delivery().transport().sent.len(), 3);

    match &node.delivery().transport().sent[0].1.payload {
        Payload::Config(config) => {
            assert_eq!(config.name, "Test light");
            assert_eq!(config.class, ChannelProfile::RgbPlusColdAndWarmWhite.tag());
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn presence_loss_flushes_pending_deliveries() {
    let start = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, start);
    node.advance(start);
    node.poll(start);
    assert_eq!(node.delivery().pending_len(), 3);

    node.advance(start + Duration::from_millis(14_999));
    assert!(node.presence().is_available());
    assert_eq!(node.delivery().pending_len(), 3);

    node.advance(start + Duration::from_secs(15));
    assert!(!node.presence().is_available());
    assert_eq!(node.delivery().pending_len(), 0);

    // Stale acknowledgments after the flush are harmless
    node.on_acknowledge(AckEvent {
        destination: GATEWAY_A,
        sequence_id: 0,
        success: false,
    });
    assert_eq!(node.delivery().pending_len(), 0);
    assert_eq!(node.delivery().transport().sent.len(), 3);
}

#[test]
fn refresh_just_before_expiry_keeps_the_gateway() {
    let start = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, start);

    node.handle_frame(
        &keep_alive(GATEWAY_A, false),
        start + Duration::from_millis(14_999),
    );
    node.advance(start + Duration::from_secs(15));
    assert_eq!(node.presence().bound_gateway(), Some(GATEWAY_A));
    assert!(node.next_deadline() <= start + Duration::from_millis(29_999));
}

#[test]
fn late_keep_alive_expires_the_window_before_rebinding() {
    let start = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, start);
    node.advance(start);
    node.poll(start);
    assert_eq!(node.delivery().pending_len(), 3);

    // Handled without an advance in between, past the 15 s window
    let late = start + Duration::from_secs(20);
    node.handle_frame(&keep_alive(GATEWAY_A, false), late);

    assert_eq!(node.delivery().pending_len(), 0);
    assert_eq!(node.presence().bound_gateway(), Some(GATEWAY_A));
    assert_eq!(node.presence().deadline(), Some(late + Duration::from_secs(15)));
}

#[test]
fn late_command_after_expiry_is_ignored() {
    let start = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, start);
    let before = *node.state();

    let on = SetCommand {
        power: Some("ON".to_string()),
        ..Default::default()
    };
    node.handle_frame(&set(GATEWAY_A, on), start + Duration::from_secs(16));

    assert!(!node.presence().is_available());
    assert_eq!(*node.state(), before);
}

#[test]
fn negative_ack_is_retried_until_acknowledged() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, now);
    node.handle_frame(&keep_alive(GATEWAY_A, true), now);
    let (first, envelope, _) = node.delivery().transport().sent[0].clone();

    node.on_acknowledge(AckEvent {
        destination: GATEWAY_A,
        sequence_id: first,
        success: false,
    });
    let (retry, resent, destination) = node.delivery().transport().sent.last().unwrap().clone();
    assert_ne!(retry, first);
    assert_eq!(resent, envelope);
    assert_eq!(destination, GATEWAY_A);
    assert_eq!(node.delivery().pending_len(), 3);

    for (id, _, _) in node.delivery().transport().sent.clone() {
        node.on_acknowledge(AckEvent {
            destination: GATEWAY_A,
            sequence_id: id,
            success: true,
        });
    }
    assert_eq!(node.delivery().pending_len(), 0);
}

#[test]
fn set_command_drives_persists_and_reports() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::RgbPlusColdAndWarmWhite, now);
    let saves_before = node.store().saves;

    let command = SetCommand {
        power: Some("ON".to_string()),
        brightness: Some(128),
        rgb: Some("255,0,0".to_string()),
        ..Default::default()
    };
    assert_eq!(node.handle_frame(&set(GATEWAY_A, command), now), None);

    assert!(node.state().power);
    assert_eq!(node.driver().last(Channel::Red), Some(128));
    assert_eq!(node.driver().last(Channel::Green), Some(0));
    assert_eq!(node.driver().last(Channel::ColdWhite), Some(0));
    assert_eq!(node.store().saves, saves_before + 1);

    let (_, report, _) = node.delivery().transport().sent.last().unwrap();
    match &report.payload {
        Payload::State(report) => {
            assert_eq!(report.state, SwitchState::On);
            assert_eq!(report.brightness, 128);
            assert_eq!(report.rgb, "255,0,0");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn white_sentinel_switches_to_white_channels() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::RgbPlusColdAndWarmWhite, now);

    let command = SetCommand {
        power: Some("on".to_string()),
        brightness: Some(255),
        color_temperature: Some(153),
        rgb: Some("255,255,255".to_string()),
    };
    node.handle_frame(&set(GATEWAY_A, command), now);

    assert_eq!(node.driver().last(Channel::Red), Some(0));
    assert_eq!(node.driver().last(Channel::Green), Some(0));
    assert_eq!(node.driver().last(Channel::Blue), Some(0));
    assert_eq!(node.driver().last(Channel::ColdWhite), Some(255));
    assert_eq!(node.driver().last(Channel::WarmWhite), Some(0));
}

#[test]
fn partial_set_keeps_other_fields() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::ColdAndWarmWhite, now);
    let before = *node.state();

    node.handle_frame(
        &set(
            GATEWAY_A,
            SetCommand {
                brightness: Some(10),
                ..Default::default()
            },
        ),
        now,
    );

    assert_eq!(node.state().brightness, 10);
    assert_eq!(node.state().power, before.power);
    assert_eq!(node.state().color_temperature, before.color_temperature);
}

#[test]
fn badly_typed_key_does_not_void_the_command() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, now);

    let document = br#"{"power":"ON","brightness":12.5,"rgb":[1,2,3]}"#;
    let mut bytes = vec![DeviceType::Gateway as u8, PayloadKind::Set as u8];
    bytes.extend_from_slice(document);
    bytes.resize(ENVELOPE_LEN, 0);

    node.handle_frame(
        &InboundFrame {
            sender: GATEWAY_A,
            delivery: Delivery::Unicast,
            bytes,
        },
        now,
    );

    assert!(node.state().power);
    assert_eq!(node.state().brightness, 12);
    assert!(node.state().is_full_white());
    assert_eq!(node.driver().last(Channel::Red), Some(12));
}

#[test]
fn foreign_and_non_gateway_frames_are_ignored() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, now);
    let before = *node.state();
    let on = SetCommand {
        power: Some("ON".to_string()),
        ..Default::default()
    };

    node.handle_frame(&set(GATEWAY_B, on.clone()), now);
    node.handle_frame(
        &frame(GATEWAY_A, Delivery::Unicast, DeviceType::Switch, Payload::Set(on.clone())),
        now,
    );
    node.handle_frame(
        &frame(GATEWAY_A, Delivery::Broadcast, DeviceType::Gateway, Payload::Set(on)),
        now,
    );
    node.handle_frame(
        &InboundFrame {
            sender: GATEWAY_A,
            delivery: Delivery::Unicast,
            bytes: vec![5, 2, 0],
        },
        now,
    );

    assert_eq!(*node.state(), before);
    assert!(node.delivery().transport().sent.is_empty());
}

#[test]
fn unicast_before_binding_is_ignored() {
    let now = Instant::now();
    let mut node = boot(ChannelProfile::Rgb, MemoryStore::default(), now);
    let restart = frame(GATEWAY_A, Delivery::Unicast, DeviceType::Gateway, Payload::Restart);
    assert_eq!(node.handle_frame(&restart, now), None);
}

#[test]
fn update_and_restart_are_handed_back() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, now);

    let update = frame(GATEWAY_A, Delivery::Unicast, DeviceType::Gateway, Payload::Update);
    assert_eq!(
        node.handle_frame(&update, now),
        Some(MaintenanceRequest::OpenAccessPoint)
    );

    let restart = frame(GATEWAY_A, Delivery::Unicast, DeviceType::Gateway, Payload::Restart);
    assert_eq!(
        node.handle_frame(&restart, now),
        Some(MaintenanceRequest::Restart)
    );
}

#[test]
fn reconfigure_rerenders_and_announces_config() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, now);
    node.advance(now);
    node.poll(now);
    let sent_before = node.delivery().transport().sent.len();

    node.reconfigure(ChannelProfile::ColdWhite, RecordingDriver::default());
    assert_eq!(node.profile(), ChannelProfile::ColdWhite);
    assert_eq!(node.driver().writes, vec![(Channel::ColdWhite, 0)]);

    node.poll(now);
    let kinds = node.delivery().transport().kinds();
    assert_eq!(kinds.len(), sent_before + 1);
    assert_eq!(kinds.last(), Some(&PayloadKind::Config));

    node.request_config_announcement();
    node.poll(now);
    assert_eq!(
        node.delivery().transport().kinds().last(),
        Some(&PayloadKind::Config)
    );
}

#[test]
fn compute_only_render_leaves_outputs_alone() {
    let now = Instant::now();
    let mut node = bound_node(ChannelProfile::Rgb, now);
    let writes = node.driver().writes.len();
    let saves = node.store().saves;

    let first = node.render(RenderMode::ComputeOnly);
    let second = node.render(RenderMode::ComputeOnly);
    assert_eq!(first, second);
    assert_eq!(node.driver().writes.len(), writes);
    assert_eq!(node.store().saves, saves);
}
