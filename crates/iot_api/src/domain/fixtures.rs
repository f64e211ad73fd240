use chrono::Utc;
use common::domain::{Actor, Device, DeviceEvent, Owner, IOT_MANAGER_ROLE};

pub fn event(id: &str, wechat_notify: bool) -> DeviceEvent {
    let now = Utc::now();
    DeviceEvent {
        id: id.to_string(),
        device_id: "SN-1".to_string(),
        event_source: "sensor".to_string(),
        event_level: 3,
        event_type: "alarm".to_string(),
        event_info: "Over temperature".to_string(),
        event_data: "{\"temp\":97.5}".to_string(),
        event_time: now,
        owner: Owner::User("alice@example.com".to_string()),
        owner_company: Some("company-1".to_string()),
        wechat_notify,
        disposal: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn device(serial: &str, company_id: &str) -> Device {
    Device {
        serial: serial.to_string(),
        name: format!("Boiler {}", serial),
        description: None,
        company_id: Some(company_id.to_string()),
        owner: Owner::Company(company_id.to_string()),
        longitude: Some(116.4),
        latitude: Some(39.9),
        use_beta: false,
        use_beta_start_time: None,
        created_at: Some(Utc::now()),
        updated_at: None,
    }
}

pub fn user(user_id: &str) -> Actor {
    Actor::new(user_id, Vec::new())
}

pub fn manager(user_id: &str) -> Actor {
    Actor::new(user_id, vec![IOT_MANAGER_ROLE.to_string()])
}
