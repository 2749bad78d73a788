use nice::topology::SchedWindow;

#[test]
fn parses_clock_ranges_and_always() {
    let w: SchedWindow = "18:00-06:30".parse().unwrap();
    assert_eq!(w, SchedWindow::from_hm(18, 0, 6, 30));
    assert!(w.wraps());
    assert_eq!(w.minutes(), 12 * 60 + 30);
    assert_eq!(w.to_string(), "18:00-06:30");

    assert_eq!("always".parse::<SchedWindow>().unwrap(), SchedWindow::ALWAYS);
    assert_eq!("09:00-24:00".parse::<SchedWindow>().unwrap(), SchedWindow::new(540, 0));

    for bad in ["", "9-17", "25:00-01:00", "10:60-11:00", "10:00"] {
        assert!(bad.parse::<SchedWindow>().is_err(), "{bad:?} should not parse");
    }

    let err: Box<dyn std::error::Error> = "9-17".parse::<SchedWindow>().unwrap_err().into();
    assert_eq!(
        err.to_string(),
        "invalid scheduling window '9-17', expected HH:MM-HH:MM"
    );
}

#[test]
fn equal_endpoints_mean_the_whole_day() {
    let w = SchedWindow::from_hm(7, 15, 7, 15);
    assert!(w.is_full_day());
    assert_eq!(w.minutes(), 1440);
    assert!(w.contains(0));
    assert!(w.contains(1439));
}

#[test]
fn containment_is_half_open_and_wraps() {
    let night = SchedWindow::from_hm(22, 0, 2, 0);
    assert!(night.contains(22 * 60));
    assert!(night.contains(23 * 60 + 59));
    assert!(night.contains(60));
    assert!(!night.contains(2 * 60));
    assert!(!night.contains(12 * 60));
}

#[test]
fn overlap_counts_shared_minutes() {
    let office = SchedWindow::from_hm(9, 0, 17, 0);
    let lunch = SchedWindow::from_hm(12, 0, 13, 0);
    assert_eq!(office.overlap(&lunch), 60);
    assert_eq!(lunch.overlap(&office), 60);

    let night = SchedWindow::from_hm(22, 0, 6, 0);
    let late = SchedWindow::from_hm(16, 0, 23, 0);
    assert_eq!(night.overlap(&late), 60);
    assert_eq!(office.overlap(&night), 0);

    // Both wrap: 23:00-01:00 lies entirely inside 22:00-06:00.
    let midnight = SchedWindow::from_hm(23, 0, 1, 0);
    assert_eq!(night.overlap(&midnight), 120);

    assert_eq!(SchedWindow::ALWAYS.overlap(&office), 8 * 60);
    assert_eq!(SchedWindow::ALWAYS.overlap(&SchedWindow::ALWAYS), 1440);
}

#[test]
fn utc_conversion_round_trips_across_midnight() {
    // UTC+02:00
    let local = SchedWindow::from_hm(1, 0, 5, 0);
    let utc = local.to_utc(120);
    assert_eq!(utc, SchedWindow::from_hm(23, 0, 3, 0));
    assert_eq!(utc.from_utc(120), local);

    // UTC-05:00
    let local = SchedWindow::from_hm(21, 0, 23, 30);
    assert_eq!(local.to_utc(-300), SchedWindow::from_hm(2, 0, 4, 30));

    assert_eq!(SchedWindow::ALWAYS.to_utc(330), SchedWindow::ALWAYS);
}
