mod common;

use bl702_pcd::{Config, DeviceState, Error, Interrupt, Pcd, SharedPcd};
use common::{addr, Event, MockUsb, Recorder};
use embassy_usb_driver::EndpointType;

fn new_pcd() -> Pcd<MockUsb, Recorder> {
    Pcd::new(MockUsb::new(), Config::default(), Recorder::default())
}

#[test]
fn init_start_stop_deinit() {
    let mut pcd = new_pcd();
    assert_eq!(pcd.device().state(), DeviceState::Reset);
    assert_eq!(pcd.start(), Err(Error::InvalidState));

    pcd.init().unwrap();
    assert_eq!(pcd.device().state(), DeviceState::Ready);
    assert!(!pcd.device().hardware().enabled);

    pcd.start().unwrap();
    let hw = pcd.device().hardware();
    assert!(hw.enabled);
    assert!(hw.pullup);
    assert_eq!(hw.int_enabled & Interrupt::StartOfFrame.bit(), 0);
    assert_ne!(hw.int_enabled & Interrupt::Reset.bit(), 0);
    assert_ne!(hw.int_enabled & Interrupt::Ep0SetupDone.bit(), 0);

    pcd.stop().unwrap();
    let hw = pcd.device().hardware();
    assert!(!hw.enabled);
    assert!(!hw.pullup);
    assert_eq!(hw.int_enabled, 0);

    pcd.deinit().unwrap();
    assert_eq!(pcd.device().state(), DeviceState::Reset);
}

#[test]
fn init_zeroes_the_endpoint_table() {
    let mut pcd = new_pcd();
    pcd.init().unwrap();
    pcd.device_mut()
        .ep_open(addr(0x81), 64, EndpointType::Bulk)
        .unwrap();
    pcd.device_mut().set_address(3).unwrap();

    pcd.init().unwrap();

    let dev = pcd.device();
    assert_eq!(dev.endpoint(addr(0x81)).unwrap().max_packet_size(), 0);
    assert_eq!(dev.address(), 0);
    assert_eq!(dev.setup_packet(), [0; 8]);
}

#[test]
fn connect_and_disconnect_drive_the_pullup() {
    let mut pcd = new_pcd();
    pcd.init().unwrap();
    let dev = pcd.device_mut();
    dev.dev_connect().unwrap();
    assert!(dev.hardware().pullup);
    dev.dev_disconnect().unwrap();
    assert!(!dev.hardware().pullup);
}

#[test]
fn remote_wakeup_is_recorded() {
    let mut pcd = new_pcd();
    pcd.init().unwrap();
    let dev = pcd.device_mut();
    dev.activate_remote_wakeup().unwrap();
    assert!(dev.remote_wakeup_active());
    dev.deactivate_remote_wakeup().unwrap();
    assert!(!dev.remote_wakeup_active());
}

#[test]
fn shared_pcd_dispatches_interrupts() {
    let shared: SharedPcd<MockUsb, Recorder> = SharedPcd::new();
    // An interrupt before anything is installed is ignored.
    shared.on_interrupt();
    assert!(shared.with(|_| ()).is_none());

    let mut pcd = new_pcd();
    pcd.init().unwrap();
    shared.install(pcd);

    shared.with(|pcd| pcd.device_mut().hardware_mut().raise(Interrupt::Reset));
    shared.on_interrupt();

    let events = shared.with(|pcd| pcd.callbacks().events.clone());
    assert_eq!(events, Some(vec![Event::Reset]));

    let pcd = shared.take().unwrap();
    let (_device, recorder) = pcd.into_parts();
    assert_eq!(recorder.events, [Event::Reset]);
    assert!(shared.take().is_none());
}
