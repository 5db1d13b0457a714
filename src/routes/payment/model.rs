use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::routes::product::model::Product;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutItem {
    pub product_id: String,
    pub count: i64,
}

#[derive(Debug)]
pub struct CartLine {
    pub product: Product,
    pub count: i64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn cart_total(lines: &[CartLine]) -> f64 {
    let total = lines
        .iter()
        .map(|line| line.count as f64 * line.product.unit_price())
        .sum();
    round2(total)
}

/// 网关要求空格编码成 +,这里统一在一处处理
fn encode_value(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

/// 按字段构造顺序拼 k=v&,跳过空值和 signature 字段本身;
/// 配了口令就追加 passphrase。校验方必须逐字节复现这串。
pub fn build_param_string(fields: &[(String, String)], passphrase: Option<&str>) -> String {
    let mut parts: Vec<String> = fields
        .iter()
        .filter(|(name, value)| name != "signature" && !value.is_empty())
        .map(|(name, value)| format!("{}={}", name, encode_value(value)))
        .collect();

    if let Some(passphrase) = passphrase.filter(|p| !p.is_empty()) {
        parts.push(format!("passphrase={}", encode_value(passphrase)));
    }

    parts.join("&")
}

pub fn sign_params(fields: &[(String, String)], passphrase: Option<&str>) -> String {
    let param_string = build_param_string(fields, passphrase);
    let mut hasher = Sha256::new();
    hasher.update(param_string.as_bytes());
    hex::encode(hasher.finalize())
}

/// 回调验签:取报文自带的 signature,与按同一规则重算的值比对
pub fn verify_signature(fields: &[(String, String)], passphrase: Option<&str>) -> bool {
    let Some(received) = fields
        .iter()
        .find(|(name, _)| name == "signature")
        .map(|(_, value)| value.to_lowercase())
    else {
        return false;
    };

    sign_params(fields, passphrase) == received
}

/// 跳转网关的固定字段集,顺序即签名顺序
pub fn gateway_fields(
    config: &Config,
    buyer_name: &str,
    buyer_email: &str,
    order_id: &str,
    amount: f64,
    item_name: &str,
    item_ids_csv: &str,
) -> Vec<(String, String)> {
    let mut fields = vec![
        ("merchant_id".to_string(), config.payment_merchant_id.clone()),
        ("merchant_key".to_string(), config.payment_merchant_key.clone()),
        (
            "return_url".to_string(),
            format!("{}/payment/success", config.base_url),
        ),
        (
            "cancel_url".to_string(),
            format!("{}/payment/cancel", config.base_url),
        ),
        (
            "notify_url".to_string(),
            format!("{}/api/payments/notify", config.base_url),
        ),
        ("name_first".to_string(), buyer_name.to_string()),
        ("email_address".to_string(), buyer_email.to_string()),
        ("m_payment_id".to_string(), order_id.to_string()),
        ("amount".to_string(), format!("{:.2}", amount)),
        ("item_name".to_string(), item_name.to_string()),
        ("custom_str1".to_string(), item_ids_csv.to_string()),
    ];

    let signature = sign_params(&fields, config.payment_passphrase.as_deref());
    fields.push(("signature".to_string(), signature));
    fields
}

/// 回调报文既可能是 JSON 也可能是表单编码,都解成有序键值对
pub fn parse_notify_body(content_type: &str, body: &[u8]) -> Option<Vec<(String, String)>> {
    if content_type.contains("json") {
        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(body).ok()?;
        let pairs = object
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect();
        return Some(pairs);
    }

    let body = std::str::from_utf8(body).ok()?;
    let mut pairs = Vec::new();
    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        pairs.push((form_decode(name)?, form_decode(value)?));
    }
    Some(pairs)
}

// 表单编码里 + 代表空格,先还原再做百分号解码
fn form_decode(value: &str) -> Option<String> {
    urlencoding::decode(&value.replace('+', " "))
        .ok()
        .map(|v| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, mrp: f64, sale_price: f64) -> Product {
        Product {
            product_id: id.into(),
            name: id.to_uppercase(),
            description: String::new(),
            category: "tax".into(),
            mrp,
            sale_price,
            image_url: None,
            active: true,
        }
    }

    fn sample_fields() -> Vec<(String, String)> {
        vec![
            ("merchant_id".to_string(), "10000100".to_string()),
            ("merchant_key".to_string(), "46f0cd694581a".to_string()),
            ("name_first".to_string(), "Asha Verma".to_string()),
            ("email_address".to_string(), "asha@example.com".to_string()),
            ("amount".to_string(), "1200.00".to_string()),
            ("item_name".to_string(), "ITR Filing, GST Return".to_string()),
            ("empty_field".to_string(), String::new()),
        ]
    }

    #[test]
    fn cart_total_uses_sale_price_when_positive() {
        let lines = vec![
            CartLine { product: product("a", 500.0, 450.0), count: 2 },
            CartLine { product: product("b", 300.0, 0.0), count: 1 },
        ];
        assert_eq!(cart_total(&lines), 1200.00);
    }

    #[test]
    fn signature_is_deterministic_and_sensitive_to_any_field() {
        let fields = sample_fields();
        let first = sign_params(&fields, Some("secret"));
        let second = sign_params(&fields, Some("secret"));
        assert_eq!(first, second);

        let mut changed = sample_fields();
        changed[4].1 = "1200.01".to_string();
        assert_ne!(first, sign_params(&changed, Some("secret")));

        assert_ne!(first, sign_params(&fields, None));
    }

    #[test]
    fn signature_field_and_empty_values_are_excluded() {
        let fields = sample_fields();
        let base = sign_params(&fields, None);

        let mut with_signature = sample_fields();
        with_signature.push(("signature".to_string(), "deadbeef".to_string()));
        assert_eq!(base, sign_params(&with_signature, None));

        let param_string = build_param_string(&fields, None);
        assert!(!param_string.contains("empty_field"));
        assert!(param_string.contains("name_first=Asha+Verma"));
    }

    #[test]
    fn verify_accepts_our_own_signature() {
        let mut fields = sample_fields();
        let signature = sign_params(&fields, Some("secret"));
        fields.push(("signature".to_string(), signature));
        assert!(verify_signature(&fields, Some("secret")));
        assert!(!verify_signature(&fields, Some("other")));
    }

    #[test]
    fn notify_body_parses_both_encodings_in_order() {
        let form = b"m_payment_id=ord-1&amount=999.00&email_address=asha%40example.com&item_name=ITR+Filing";
        let pairs = parse_notify_body("application/x-www-form-urlencoded", form).unwrap();
        assert_eq!(pairs[0], ("m_payment_id".to_string(), "ord-1".to_string()));
        assert_eq!(pairs[2].1, "asha@example.com");
        assert_eq!(pairs[3].1, "ITR Filing");

        let json = br#"{"m_payment_id":"ord-1","amount":999,"email_address":"asha@example.com"}"#;
        let pairs = parse_notify_body("application/json", json).unwrap();
        assert_eq!(pairs[1], ("amount".to_string(), "999".to_string()));
    }

    #[test]
    fn round2_collapses_float_noise_to_two_decimals() {
        assert_eq!(round2(1199.999999), 1200.0);
        assert_eq!(round2(1234.5678), 1234.57);
        assert_eq!(round2(10.004), 10.0);
    }
}
