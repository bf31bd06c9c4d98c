use stream_api::{ColumnType, PluginError, RawRecord, UserRecord};

/// Decoder: value сообщения → UTF-8 → JSON object → `UserRecord`.
///
/// Ошибки всегда `ErrorKind::Format`: вызывающий пропускает запись.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    id_type: ColumnType,
}

impl Decoder {
    pub fn new(id_type: ColumnType) -> Self {
        Self { id_type }
    }

    pub fn decode(&self, record: &RawRecord) -> Result<UserRecord, PluginError> {
        let value = record
            .value
            .as_deref()
            .ok_or_else(|| PluginError::format_err("record has no value"))?;
        self.decode_payload(value)
    }

    pub fn decode_payload(&self, payload: &[u8]) -> Result<UserRecord, PluginError> {
        let text = std::str::from_utf8(payload)?;
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| PluginError::format_err(format!("user json: {e}")))?;
        // Derive(Deserialize) принимает и массив (поля по позиции), нужен только object.
        if !value.is_object() {
            return Err(PluginError::format_err("user json: expected an object"));
        }
        let mut user: UserRecord = serde_json::from_value(value)
            .map_err(|e| PluginError::format_err(format!("user json: {e}")))?;

        if self.id_type == ColumnType::Uuid {
            let id = uuid::Uuid::parse_str(&user.id)
                .map_err(|e| PluginError::format_err(format!("id '{}' is not a uuid: {e}", user.id)))?;
            user.id = id.hyphenated().to_string();
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_api::ErrorKind;

    const SAMPLE: &str = r#"{"id":"u1","first_name":"Ann","last_name":"Lee","gender":"f","address":"1 Main St","post_code":"00001","email":"a@x.com","username":"ann","registered_date":"2024-01-01","phone":"000","picture":"http://x/p.png"}"#;

    fn raw(value: Option<&[u8]>) -> RawRecord {
        RawRecord {
            topic: "users_created".into(),
            partition: 0,
            offset: 0,
            value: value.map(|v| v.to_vec()),
            ts_ms: None,
        }
    }

    #[test]
    fn decodes_sample() {
        let user = Decoder::new(ColumnType::Text).decode(&raw(Some(SAMPLE.as_bytes()))).unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.last_name, "Lee");
        assert_eq!(user.registered_date, "2024-01-01");
        assert_eq!(user.dob, None);
    }

    #[test]
    fn keeps_dob_when_present() {
        let payload = SAMPLE.replace(r#""username":"ann","#, r#""username":"ann","dob":"1990-01-01","#);
        let user = Decoder::new(ColumnType::Text).decode_payload(payload.as_bytes()).unwrap();
        assert_eq!(user.dob.as_deref(), Some("1990-01-01"));
    }

    #[test]
    fn rejects_bad_input_as_format_errors() {
        let decoder = Decoder::new(ColumnType::Text);
        let missing = SAMPLE.replace(r#""email":"a@x.com","#, "");
        let null_field = SAMPLE.replace(r#""phone":"000""#, r#""phone":null"#);
        let cases: Vec<RawRecord> = vec![
            raw(None),
            raw(Some(&[0xff, 0xfe, 0x00])),
            raw(Some(b"not json")),
            raw(Some(b"[1,2,3]")),
            raw(Some(br#"["u1","Ann","Lee","f","1 Main St","00001","a@x.com","ann",null,"2024-01-01","000","http://x/p.png"]"#)),
            raw(Some(b"\"u1\"")),
            raw(Some(missing.as_bytes())),
            raw(Some(null_field.as_bytes())),
        ];
        for case in &cases {
            let err = decoder.decode(case).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format, "{err:?}");
        }
    }

    #[test]
    fn uuid_ids_are_validated_and_normalized() {
        let decoder = Decoder::new(ColumnType::Uuid);
        assert!(decoder.decode_payload(SAMPLE.as_bytes()).is_err());

        let payload = SAMPLE.replace(r#""id":"u1""#, r#""id":"67E55044-10B1-426F-9247-BB680E5FE0C8""#);
        let user = decoder.decode_payload(payload.as_bytes()).unwrap();
        assert_eq!(user.id, "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }
}
