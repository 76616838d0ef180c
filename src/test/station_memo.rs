use crate::conn::StationMemo;

#[test]
fn power_save_is_remembered_per_interface() {
    let memo = StationMemo::new();
    assert!(!memo.power_save_disabled("wlan0"));
    memo.mark_power_save_disabled("wlan0");
    assert!(memo.power_save_disabled("wlan0"));
    assert!(!memo.power_save_disabled("wlan1"));
}

#[test]
fn local_ip_must_match_recorded_address() {
    let memo = StationMemo::new();
    assert!(!memo.has_local_ip("wlan0", "192.168.4.2/24"));
    memo.mark_local_ip("wlan0", "192.168.4.2/24");
    assert!(memo.has_local_ip("wlan0", "192.168.4.2/24"));
    // 地址变了需要重新设置
    assert!(!memo.has_local_ip("wlan0", "192.168.5.2/24"));
    memo.mark_local_ip("wlan0", "192.168.5.2/24");
    assert!(memo.has_local_ip("wlan0", "192.168.5.2/24"));
    assert!(!memo.has_local_ip("wlan0", "192.168.4.2/24"));
}

#[test]
fn clones_share_one_record() {
    let memo = StationMemo::new();
    let other = memo.clone();
    other.mark_power_save_disabled("wlan0");
    other.mark_local_ip("wlan0", "10.0.0.2/8");
    assert!(memo.power_save_disabled("wlan0"));
    assert!(memo.has_local_ip("wlan0", "10.0.0.2/8"));

    let handle = std::thread::spawn(move || other.mark_power_save_disabled("wlan9"));
    handle.join().expect("thread");
    assert!(memo.power_save_disabled("wlan9"));
}
