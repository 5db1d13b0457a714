use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use validator::ValidateEmail;

/// 动态表单的字段规则。File 字段在提交时以已上传文件满足,
/// 其余都按字符串值校验。
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Email,
    Phone,
    Number,
    Date,
    File,
    Choice(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldRule {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub max_len: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FormStep {
    pub name: &'static str,
    pub fields: &'static [FieldRule],
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FormDef {
    pub form_id: &'static str,
    pub title: &'static str,
    pub collection: &'static str,
    pub steps: &'static [FormStep],
}

const ITR_FILING: FormDef = FormDef {
    form_id: "itr-filing",
    title: "ITR Filing",
    collection: "itr_filings",
    steps: &[
        FormStep {
            name: "personal",
            fields: &[
                FieldRule { name: "full_name", label: "Full name", kind: FieldKind::Text, required: true, max_len: 64 },
                FieldRule { name: "pan", label: "PAN", kind: FieldKind::Text, required: true, max_len: 10 },
                FieldRule { name: "email", label: "Email", kind: FieldKind::Email, required: true, max_len: 120 },
                FieldRule { name: "phone", label: "Phone", kind: FieldKind::Phone, required: true, max_len: 15 },
                FieldRule { name: "dob", label: "Date of birth", kind: FieldKind::Date, required: true, max_len: 10 },
            ],
        },
        FormStep {
            name: "income",
            fields: &[
                FieldRule {
                    name: "employment_type",
                    label: "Employment type",
                    kind: FieldKind::Choice(&["salaried", "self-employed", "business"]),
                    required: true,
                    max_len: 20,
                },
                FieldRule { name: "annual_income", label: "Annual income", kind: FieldKind::Number, required: true, max_len: 14 },
                FieldRule { name: "form16", label: "Form 16", kind: FieldKind::File, required: true, max_len: 0 },
            ],
        },
        FormStep {
            name: "documents",
            fields: &[
                FieldRule { name: "bank_statement", label: "Bank statement", kind: FieldKind::File, required: true, max_len: 0 },
                FieldRule { name: "remarks", label: "Remarks", kind: FieldKind::Text, required: false, max_len: 500 },
            ],
        },
    ],
};

const GST_REGISTRATION: FormDef = FormDef {
    form_id: "gst-registration",
    title: "GST Registration",
    collection: "gst_registrations",
    steps: &[
        FormStep {
            name: "business",
            fields: &[
                FieldRule { name: "business_name", label: "Business name", kind: FieldKind::Text, required: true, max_len: 120 },
                FieldRule { name: "pan", label: "PAN", kind: FieldKind::Text, required: true, max_len: 10 },
                FieldRule { name: "email", label: "Email", kind: FieldKind::Email, required: true, max_len: 120 },
                FieldRule { name: "phone", label: "Phone", kind: FieldKind::Phone, required: true, max_len: 15 },
            ],
        },
        FormStep {
            name: "address",
            fields: &[
                FieldRule { name: "address_line", label: "Address", kind: FieldKind::Text, required: true, max_len: 200 },
                FieldRule { name: "city", label: "City", kind: FieldKind::Text, required: true, max_len: 64 },
                FieldRule { name: "pincode", label: "PIN code", kind: FieldKind::Number, required: true, max_len: 6 },
            ],
        },
        FormStep {
            name: "documents",
            fields: &[
                FieldRule { name: "pan_card", label: "PAN card", kind: FieldKind::File, required: true, max_len: 0 },
                FieldRule { name: "address_proof", label: "Address proof", kind: FieldKind::File, required: true, max_len: 0 },
            ],
        },
    ],
};

const GST_RETURN: FormDef = FormDef {
    form_id: "gst-return",
    title: "GST Return Filing",
    collection: "gst_returns",
    steps: &[FormStep {
        name: "return",
        fields: &[
            FieldRule { name: "gstin", label: "GSTIN", kind: FieldKind::Text, required: true, max_len: 15 },
            FieldRule { name: "period", label: "Return period", kind: FieldKind::Date, required: true, max_len: 10 },
            FieldRule { name: "total_sales", label: "Total sales", kind: FieldKind::Number, required: true, max_len: 14 },
            FieldRule { name: "total_purchases", label: "Total purchases", kind: FieldKind::Number, required: true, max_len: 14 },
        ],
    }],
};

const FORMS: &[FormDef] = &[ITR_FILING, GST_REGISTRATION, GST_RETURN];

pub fn all_forms() -> &'static [FormDef] {
    FORMS
}

pub fn find_form(form_id: &str) -> Option<&'static FormDef> {
    FORMS.iter().find(|f| f.form_id == form_id)
}

/// 单字段校验,通过返回 None,否则返回错误文案
pub fn validate_field(rule: &FieldRule, value: Option<&str>) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty());

    let value = match value {
        Some(value) => value,
        None => {
            return rule
                .required
                .then(|| format!("{} is required", rule.label));
        }
    };

    if rule.max_len > 0 && value.chars().count() > rule.max_len {
        return Some(format!("{} must be at most {} characters", rule.label, rule.max_len));
    }

    match rule.kind {
        FieldKind::Text | FieldKind::File => None,
        FieldKind::Email => (!value.validate_email())
            .then(|| format!("{} must be a valid email address", rule.label)),
        FieldKind::Phone => {
            let digits = value.chars().filter(char::is_ascii_digit).count();
            let well_formed = value
                .chars()
                .all(|c| c.is_ascii_digit() || c == '+' || c == '-' || c == ' ');
            (!(well_formed && (7..=15).contains(&digits)))
                .then(|| format!("{} must be a valid phone number", rule.label))
        }
        FieldKind::Number => value
            .parse::<f64>()
            .is_err()
            .then(|| format!("{} must be a number", rule.label)),
        FieldKind::Date => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .is_err()
            .then(|| format!("{} must be a date in YYYY-MM-DD form", rule.label)),
        FieldKind::Choice(options) => (!options.contains(&value))
            .then(|| format!("{} must be one of: {}", rule.label, options.join(", "))),
    }
}

/// 只校验指定步骤声明的字段,别的步骤一概不看
pub fn validate_step(
    def: &FormDef,
    step: usize,
    values: &HashMap<String, String>,
) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();
    let Some(step) = def.steps.get(step) else {
        return errors;
    };

    for rule in step.fields {
        if let Some(message) = validate_field(rule, values.get(rule.name).map(String::as_str)) {
            errors.insert(rule.name.to_string(), message);
        }
    }
    errors
}

pub fn validate_all(
    def: &FormDef,
    values: &HashMap<String, String>,
) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();
    for step in 0..def.steps.len() {
        errors.extend(validate_step(def, step, values));
    }
    errors
}

/// 分步表单状态机:校验通过才前进,后退永远允许,两头都夹紧
#[derive(Debug)]
pub struct FormFlow {
    def: &'static FormDef,
    current_step: usize,
    values: HashMap<String, String>,
}

impl FormFlow {
    pub fn new(def: &'static FormDef) -> Self {
        Self {
            def,
            current_step: 0,
            values: HashMap::new(),
        }
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step + 1 >= self.def.steps.len()
    }

    /// 校验失败原地不动,也绝不把无效值并进已收集的字段
    pub fn advance(
        &mut self,
        step_values: &HashMap<String, String>,
    ) -> Result<usize, BTreeMap<String, String>> {
        let errors = validate_step(self.def, self.current_step, step_values);
        if !errors.is_empty() {
            return Err(errors);
        }

        // 只吸收当前步骤声明过的字段
        if let Some(step) = self.def.steps.get(self.current_step) {
            for rule in step.fields {
                if let Some(value) = step_values.get(rule.name) {
                    self.values.insert(rule.name.to_string(), value.clone());
                }
            }
        }

        if !self.is_last_step() {
            self.current_step += 1;
        }
        Ok(self.current_step)
    }

    pub fn retreat(&mut self) -> usize {
        self.current_step = self.current_step.saturating_sub(1);
        self.current_step
    }

    pub fn validate_for_submit(&self) -> BTreeMap<String, String> {
        validate_all(self.def, &self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn valid_personal() -> HashMap<String, String> {
        values(&[
            ("full_name", "Asha Verma"),
            ("pan", "ABCDE1234F"),
            ("email", "asha@example.com"),
            ("phone", "+91 98765 43210"),
            ("dob", "1990-04-12"),
        ])
    }

    #[test]
    fn invalid_step_does_not_advance_or_touch_other_fields() {
        let def = find_form("itr-filing").unwrap();
        let mut flow = FormFlow::new(def);
        flow.advance(&valid_personal()).unwrap();
        assert_eq!(flow.current_step(), 1);

        // 第二步给出无效收入,同时夹带别的步骤的字段
        let mut step_values = values(&[
            ("employment_type", "salaried"),
            ("annual_income", "not-a-number"),
            ("remarks", "should never be absorbed"),
        ]);
        step_values.insert("form16".into(), "uploads/form16.pdf".into());

        let errors = flow.advance(&step_values).unwrap_err();
        assert!(errors.contains_key("annual_income"));
        assert_eq!(errors.len(), 1);
        assert_eq!(flow.current_step(), 1);
        // 既没有前进,也没有吸收任何字段
        assert!(!flow.values().contains_key("annual_income"));
        assert!(!flow.values().contains_key("remarks"));
        assert_eq!(flow.values().get("full_name").map(String::as_str), Some("Asha Verma"));
    }

    #[test]
    fn valid_steps_advance_and_clamp_at_last() {
        let def = find_form("gst-return").unwrap();
        let mut flow = FormFlow::new(def);
        assert!(flow.is_last_step());

        let step_values = values(&[
            ("gstin", "22AAAAA0000A1Z5"),
            ("period", "2024-03-01"),
            ("total_sales", "125000.50"),
            ("total_purchases", "80000"),
        ]);
        let step = flow.advance(&step_values).unwrap();
        assert_eq!(step, 0);
        assert!(flow.validate_for_submit().is_empty());
    }

    #[test]
    fn retreat_always_succeeds_and_clamps_at_zero() {
        let def = find_form("itr-filing").unwrap();
        let mut flow = FormFlow::new(def);
        assert_eq!(flow.retreat(), 0);
        flow.advance(&valid_personal()).unwrap();
        assert_eq!(flow.current_step(), 1);
        assert_eq!(flow.retreat(), 0);
        assert_eq!(flow.retreat(), 0);
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let def = find_form("itr-filing").unwrap();
        let errors = validate_step(def, 2, &values(&[("bank_statement", "uploads/stmt.pdf")]));
        assert!(errors.is_empty());
    }

    #[test]
    fn required_file_field_fails_when_missing() {
        let def = find_form("itr-filing").unwrap();
        let errors = validate_step(def, 2, &HashMap::new());
        assert_eq!(
            errors.get("bank_statement").map(String::as_str),
            Some("Bank statement is required")
        );
    }

    #[test]
    fn choice_and_date_rules_reject_bad_values() {
        let rule = FieldRule {
            name: "employment_type",
            label: "Employment type",
            kind: FieldKind::Choice(&["salaried", "business"]),
            required: true,
            max_len: 20,
        };
        assert!(validate_field(&rule, Some("freelancer")).is_some());
        assert!(validate_field(&rule, Some("salaried")).is_none());

        let rule = FieldRule {
            name: "dob",
            label: "Date of birth",
            kind: FieldKind::Date,
            required: true,
            max_len: 10,
        };
        assert!(validate_field(&rule, Some("12/04/1990")).is_some());
        assert!(validate_field(&rule, Some("1990-04-12")).is_none());
    }

    #[test]
    fn validate_all_covers_every_step() {
        let def = find_form("gst-registration").unwrap();
        let errors = validate_all(def, &HashMap::new());
        // 每个必填字段都要报错
        assert!(errors.contains_key("business_name"));
        assert!(errors.contains_key("address_line"));
        assert!(errors.contains_key("pan_card"));
    }
}
