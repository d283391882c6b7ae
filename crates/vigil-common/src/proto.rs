//! Messages exchanged between pipeline stages over the broker.
//!
//! The structs are written against `prost` directly rather than generated
//! from a `.proto` file; tag numbers are part of the wire contract and must
//! not be reused.

use std::collections::HashMap;

use crate::types;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    Unspecified = 0,
    Active = 1,
    Disabled = 2,
}

impl From<types::Status> for Status {
    fn from(status: types::Status) -> Self {
        match status {
            types::Status::Active => Status::Active,
            types::Status::Disabled => Status::Disabled,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StringMap {
    #[prost(map = "string, string", tag = "1")]
    pub entries: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataPoint {
    #[prost(string, tag = "1")]
    pub unique_id: String,
    #[prost(string, tag = "2")]
    pub attr: String,
    #[prost(oneof = "data_point::Value", tags = "3, 4, 5, 6, 7, 8")]
    pub value: Option<data_point::Value>,
    /// Unix milliseconds. Filled with ingest time by the Validator when absent.
    #[prost(int64, optional, tag = "9")]
    pub ts_ms: Option<i64>,
    #[prost(string, tag = "10")]
    pub token: String,
    #[prost(string, tag = "11")]
    pub trace_id: String,
}

pub mod data_point {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(int64, tag = "3")]
        IntVal(i64),
        #[prost(double, tag = "4")]
        Fl64Val(f64),
        #[prost(string, tag = "5")]
        StrVal(String),
        #[prost(bool, tag = "6")]
        BoolVal(bool),
        #[prost(bytes = "vec", tag = "7")]
        BytesVal(Vec<u8>),
        #[prost(message, tag = "8")]
        MapVal(super::StringMap),
    }
}

/// Device as carried between stages. Never includes the auth token.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Device {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub org_id: String,
    #[prost(string, tag = "3")]
    pub unique_id: String,
    #[prost(string, tag = "4")]
    pub name: String,
    #[prost(enumeration = "Status", tag = "5")]
    pub status: i32,
    #[prost(string, repeated, tag = "6")]
    pub tags: Vec<String>,
}

impl From<&types::Device> for Device {
    fn from(d: &types::Device) -> Self {
        Device {
            id: d.id.clone(),
            org_id: d.org_id.clone(),
            unique_id: d.unique_id.clone(),
            name: d.name.clone(),
            status: Status::from(d.status) as i32,
            tags: d.tags.clone(),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Rule {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub org_id: String,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(enumeration = "Status", tag = "4")]
    pub status: i32,
    #[prost(string, tag = "5")]
    pub device_tag: String,
    #[prost(string, tag = "6")]
    pub attr: String,
    #[prost(string, tag = "7")]
    pub expr: String,
}

impl From<&types::Rule> for Rule {
    fn from(r: &types::Rule) -> Self {
        Rule {
            id: r.id.clone(),
            org_id: r.org_id.clone(),
            name: r.name.clone(),
            status: Status::from(r.status) as i32,
            device_tag: r.device_tag.clone(),
            attr: r.attr.clone(),
            expr: r.expr.clone(),
        }
    }
}

/// Input to the Validator (topic `validator.in`).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidatorIn {
    #[prost(message, optional, tag = "1")]
    pub point: Option<DataPoint>,
    /// Set only by the authenticated admin path; empty for device traffic.
    #[prost(string, tag = "2")]
    pub org_id: String,
    #[prost(bool, tag = "3")]
    pub skip_token: bool,
}

/// Validator output (topic `eventer.in`).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidatorOut {
    #[prost(message, optional, tag = "1")]
    pub point: Option<DataPoint>,
    #[prost(message, optional, tag = "2")]
    pub device: Option<Device>,
}

/// Eventer output, one per matching rule (topic `alerter.in`).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventerOut {
    #[prost(message, optional, tag = "1")]
    pub point: Option<DataPoint>,
    #[prost(message, optional, tag = "2")]
    pub device: Option<Device>,
    #[prost(message, optional, tag = "3")]
    pub rule: Option<Rule>,
}
