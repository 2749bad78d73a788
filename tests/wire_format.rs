use nice::api::{ApiHeader, Verdict};
use nice::network::{ExchangeReply, RegisterReply, Request, Wish, WishKind};
use nice::topology::{SchedWindow, Slot};
use serde_json::json;

#[test]
fn requests_carry_upper_case_kind_tags() {
    let reg = Request::Register {
        version: "nice/3".into(),
        port: 4400,
        load: 12,
        barrier: false,
        depth: 0,
        window: SchedWindow::from_hm(22, 0, 6, 0),
    };
    assert_eq!(
        serde_json::to_value(&reg).unwrap(),
        json!({"REGISTER": {
            "version": "nice/3", "port": 4400, "load": 12, "barrier": false,
            "depth": 0, "window": {"start": 1320, "end": 360}
        }})
    );
    assert_eq!(serde_json::to_value(Request::Status).unwrap(), json!("STATUS"));
    assert_eq!(
        serde_json::to_value(ExchangeReply::NotYourChild).unwrap(),
        json!("NOT_YOUR_CHILD")
    );
}

#[test]
fn replies_parse_from_peers() {
    let redirect: RegisterReply =
        serde_json::from_str(r#"{"REDIRECT":{"addr":"10.0.0.7:4400"}}"#).unwrap();
    assert_eq!(
        redirect,
        RegisterReply::Redirect {
            addr: "10.0.0.7:4400".parse().unwrap()
        }
    );
    let wish: Wish = serde_json::from_str(r#"{"app":"render","kind":"put"}"#).unwrap();
    assert_eq!(wish.kind, WishKind::Put);

    assert!(serde_json::from_str::<Request>(r#"{"JOIN":{}}"#).is_err());
}

#[test]
fn api_header_names_its_slot() {
    let header = ApiHeader {
        id: 3,
        claimed: Slot::Child(2),
        port: 4401,
        pid: 99,
        epoch: 5,
        big_endian: false,
    };
    let v = serde_json::to_value(&header).unwrap();
    assert_eq!(v["claimed"], json!({"child": 2}));
    assert_eq!(
        serde_json::to_value(Verdict::Accept { big_endian: true }).unwrap(),
        json!({"ACCEPT": {"big_endian": true}})
    );
}
