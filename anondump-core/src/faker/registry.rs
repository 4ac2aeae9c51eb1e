//! Capability registry mapping expression calls onto generators.
//!
//! Root methods are called directly (`faker.IntBetween(1, 9)`); namespaces are
//! argument-less accessors followed by one method
//! (`faker.Internet().Email()`). Names are case-sensitive.

use super::{FakerError, FakerValue, parser::Call, parser::Expression};
use fake::Fake;
use fake::faker::{
    address::en as address, boolean::en as boolean, company::en as company,
    creditcard::en as creditcard, internet::en as internet, job::en as job, lorem::en as lorem,
    name::en as name, phone_number::en as phone,
};
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Declared type of a method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Str,
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Int => write!(f, "integer"),
            ParamKind::Float => write!(f, "float"),
            ParamKind::Str => write!(f, "string"),
        }
    }
}

/// A coerced argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Arg {
    fn coerce(kind: ParamKind, raw: &str) -> Option<Self> {
        match kind {
            ParamKind::Int => raw.parse().ok().map(Arg::Int),
            ParamKind::Float => raw.parse().ok().map(Arg::Float),
            ParamKind::Str => Some(Arg::Str(raw.to_string())),
        }
    }

    fn int(&self) -> i64 {
        match self {
            Arg::Int(v) => *v,
            Arg::Float(v) => *v as i64,
            Arg::Str(_) => 0,
        }
    }

    fn float(&self) -> f64 {
        match self {
            Arg::Int(v) => *v as f64,
            Arg::Float(v) => *v,
            Arg::Str(_) => 0.0,
        }
    }

    fn text(&self) -> &str {
        match self {
            Arg::Str(v) => v,
            _ => "",
        }
    }
}

type Generator = fn(&[Arg], &mut dyn RngCore) -> Result<FakerValue, FakerError>;

/// A dispatchable method: its name, declared parameters and generator.
#[derive(Clone, Copy)]
pub struct MethodSpec {
    pub name: &'static str,
    pub params: &'static [ParamKind],
    call: Generator,
}

impl std::fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl MethodSpec {
    const fn new(name: &'static str, params: &'static [ParamKind], call: Generator) -> Self {
        Self { name, params, call }
    }

    /// Coerces raw arguments to the declared parameter kinds.
    ///
    /// # Errors
    /// Returns an arity or argument error naming `path`.
    pub fn bind(&self, path: &str, raw: &[String]) -> Result<Vec<Arg>, FakerError> {
        if raw.len() != self.params.len() {
            return Err(FakerError::ArityMismatch {
                name: path.to_string(),
                expected: self.params.len(),
                got: raw.len(),
            });
        }

        self.params
            .iter()
            .zip(raw)
            .enumerate()
            .map(|(index, (kind, value))| {
                Arg::coerce(*kind, value).ok_or_else(|| FakerError::InvalidArgument {
                    name: path.to_string(),
                    index,
                    kind: kind.to_string(),
                    value: value.clone(),
                })
            })
            .collect()
    }

    /// Runs the generator with bound arguments.
    pub fn invoke(&self, args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
        (self.call)(args, rng)
    }
}

/// Registry of root methods and namespaces.
#[derive(Debug)]
pub struct Registry {
    roots: HashMap<&'static str, MethodSpec>,
    namespaces: HashMap<&'static str, HashMap<&'static str, MethodSpec>>,
}

/// A resolved expression ready to run.
#[derive(Debug)]
pub struct Resolved<'r> {
    pub path: String,
    pub method: &'r MethodSpec,
    pub args: Vec<Arg>,
}

impl Resolved<'_> {
    /// Generates one value.
    pub fn run(&self, rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
        self.method.invoke(&self.args, rng)
    }
}

impl Registry {
    /// The process-wide registry.
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        REGISTRY.get_or_init(Self::build)
    }

    fn build() -> Self {
        let index = |methods: &[MethodSpec]| -> HashMap<&'static str, MethodSpec> {
            methods.iter().map(|m| (m.name, *m)).collect()
        };

        let namespaces = NAMESPACES
            .iter()
            .map(|(name, methods)| (*name, index(methods)))
            .collect();

        Self {
            roots: index(ROOT_METHODS),
            namespaces,
        }
    }

    /// Resolves an expression to a method and coerced arguments.
    ///
    /// # Errors
    /// Returns an error for unknown names, a namespace used without a method,
    /// arguments passed to a namespace accessor, arity mismatches and
    /// arguments that do not convert to the declared kind.
    pub fn resolve(&self, expr: &Expression) -> Result<Resolved<'_>, FakerError> {
        match &expr.chained {
            None => {
                let Call { name, args } = &expr.root;
                let Some(method) = self.roots.get(name.as_str()) else {
                    if self.namespaces.contains_key(name.as_str()) {
                        return Err(FakerError::MissingMethod(name.clone()));
                    }
                    return Err(FakerError::UnknownMethod(name.clone()));
                };
                Ok(Resolved {
                    path: name.clone(),
                    method,
                    args: method.bind(name, args)?,
                })
            }
            Some(chained) => {
                let namespace = &expr.root;
                let Some(methods) = self.namespaces.get(namespace.name.as_str()) else {
                    return Err(FakerError::UnknownNamespace(namespace.name.clone()));
                };
                if !namespace.args.is_empty() {
                    return Err(FakerError::ArityMismatch {
                        name: namespace.name.clone(),
                        expected: 0,
                        got: namespace.args.len(),
                    });
                }

                let path = expr.path();
                let Some(method) = methods.get(chained.name.as_str()) else {
                    return Err(FakerError::UnknownMethod(path));
                };
                let args = method.bind(&path, &chained.args)?;
                Ok(Resolved { path, method, args })
            }
        }
    }
}

const NONE: &[ParamKind] = &[];
const INT: &[ParamKind] = &[ParamKind::Int];
const STR: &[ParamKind] = &[ParamKind::Str];
const INT_INT: &[ParamKind] = &[ParamKind::Int, ParamKind::Int];
const INT_FLOAT_FLOAT: &[ParamKind] = &[ParamKind::Int, ParamKind::Float, ParamKind::Float];

const ROOT_METHODS: &[MethodSpec] = &[
    MethodSpec::new("IntBetween", INT_INT, int_between),
    MethodSpec::new("RandomDigit", NONE, random_digit),
    MethodSpec::new("Float", INT_FLOAT_FLOAT, float),
    MethodSpec::new("Numerify", STR, numerify),
    MethodSpec::new("Lexify", STR, lexify),
    MethodSpec::new("Bothify", STR, bothify),
];

const NAMESPACES: &[(&str, &[MethodSpec])] = &[
    (
        "Person",
        &[
            MethodSpec::new("Name", NONE, person_name),
            MethodSpec::new("FirstName", NONE, person_first_name),
            MethodSpec::new("LastName", NONE, person_last_name),
            MethodSpec::new("Title", NONE, person_title),
            MethodSpec::new("Suffix", NONE, person_suffix),
            MethodSpec::new("NameWithTitle", NONE, person_name_with_title),
        ],
    ),
    (
        "Internet",
        &[
            MethodSpec::new("Email", NONE, internet_safe_email),
            MethodSpec::new("SafeEmail", NONE, internet_safe_email),
            MethodSpec::new("FreeEmail", NONE, internet_free_email),
            MethodSpec::new("User", NONE, internet_user),
            MethodSpec::new("Password", NONE, internet_password),
            MethodSpec::new("Domain", NONE, internet_domain),
            MethodSpec::new("Ipv4", NONE, internet_ipv4),
            MethodSpec::new("Ipv6", NONE, internet_ipv6),
            MethodSpec::new("MacAddress", NONE, internet_mac_address),
            MethodSpec::new("UserAgent", NONE, internet_user_agent),
        ],
    ),
    (
        "Lorem",
        &[
            MethodSpec::new("Word", NONE, lorem_word),
            MethodSpec::new("Words", INT, lorem_words),
            MethodSpec::new("Sentence", INT, lorem_sentence),
            MethodSpec::new("Sentences", INT, lorem_sentences),
            MethodSpec::new("Paragraph", INT, lorem_paragraph),
            MethodSpec::new("Text", INT, lorem_text),
        ],
    ),
    (
        "Address",
        &[
            MethodSpec::new("City", NONE, address_city),
            MethodSpec::new("Country", NONE, address_country),
            MethodSpec::new("CountryCode", NONE, address_country_code),
            MethodSpec::new("StreetName", NONE, address_street_name),
            MethodSpec::new("StreetAddress", NONE, address_street_address),
            MethodSpec::new("PostCode", NONE, address_post_code),
            MethodSpec::new("ZipCode", NONE, address_zip_code),
            MethodSpec::new("State", NONE, address_state),
            MethodSpec::new("StateAbbr", NONE, address_state_abbr),
            MethodSpec::new("BuildingNumber", NONE, address_building_number),
            MethodSpec::new("Latitude", NONE, address_latitude),
            MethodSpec::new("Longitude", NONE, address_longitude),
        ],
    ),
    (
        "Phone",
        &[
            MethodSpec::new("Number", NONE, phone_number),
            MethodSpec::new("CellNumber", NONE, phone_cell_number),
        ],
    ),
    (
        "Company",
        &[
            MethodSpec::new("Name", NONE, company_name),
            MethodSpec::new("Suffix", NONE, company_suffix),
            MethodSpec::new("CatchPhrase", NONE, company_catch_phrase),
            MethodSpec::new("BS", NONE, company_bs),
            MethodSpec::new("Industry", NONE, company_industry),
            MethodSpec::new("Buzzword", NONE, company_buzzword),
            MethodSpec::new("JobTitle", NONE, company_job_title),
        ],
    ),
    (
        "Payment",
        &[MethodSpec::new(
            "CreditCardNumber",
            NONE,
            payment_credit_card_number,
        )],
    ),
    (
        "Boolean",
        &[
            MethodSpec::new("Bool", NONE, boolean_bool),
            MethodSpec::new("BoolWithChance", INT, boolean_with_chance),
        ],
    ),
    ("UUID", &[MethodSpec::new("V4", NONE, uuid_v4)]),
];

/// Generators that take no arguments and return text from a `fake` faker.
macro_rules! text_generator {
    ($($fn_name:ident => $faker:expr;)+) => {
        $(
            fn $fn_name(_: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
                Ok(FakerValue::Text($faker.fake_with_rng::<String, _>(rng)))
            }
        )+
    };
}

text_generator! {
    person_name => name::Name();
    person_first_name => name::FirstName();
    person_last_name => name::LastName();
    person_title => name::Title();
    person_suffix => name::Suffix();
    person_name_with_title => name::NameWithTitle();
    internet_safe_email => internet::SafeEmail();
    internet_free_email => internet::FreeEmail();
    internet_user => internet::Username();
    internet_password => internet::Password(8..20);
    internet_ipv4 => internet::IPv4();
    internet_ipv6 => internet::IPv6();
    internet_mac_address => internet::MACAddress();
    internet_user_agent => internet::UserAgent();
    lorem_word => lorem::Word();
    address_city => address::CityName();
    address_country => address::CountryName();
    address_country_code => address::CountryCode();
    address_street_name => address::StreetName();
    address_post_code => address::PostCode();
    address_zip_code => address::ZipCode();
    address_state => address::StateName();
    address_state_abbr => address::StateAbbr();
    address_building_number => address::BuildingNumber();
    address_latitude => address::Latitude();
    address_longitude => address::Longitude();
    phone_number => phone::PhoneNumber();
    phone_cell_number => phone::CellNumber();
    company_name => company::CompanyName();
    company_suffix => company::CompanySuffix();
    company_catch_phrase => company::CatchPhrase();
    company_bs => company::Bs();
    company_industry => company::Industry();
    company_buzzword => company::Buzzword();
    company_job_title => job::Title();
    payment_credit_card_number => creditcard::CreditCardNumber();
}

/// Largest count accepted by the Lorem methods.
const MAX_COUNT: usize = 65_535;

fn count(args: &[Arg], path: &str) -> Result<usize, FakerError> {
    let raw = args.first().map_or(0, Arg::int);
    usize::try_from(raw)
        .ok()
        .filter(|n| *n <= MAX_COUNT)
        .ok_or_else(|| FakerError::InvalidArgument {
            name: path.to_string(),
            index: 0,
            kind: format!("count between 0 and {}", MAX_COUNT),
            value: raw.to_string(),
        })
}

fn int_between(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let (a, b) = (args[0].int(), args[1].int());
    let (min, max) = if a <= b { (a, b) } else { (b, a) };
    Ok(FakerValue::Int(rng.random_range(min..=max)))
}

fn random_digit(_: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    Ok(FakerValue::Int(rng.random_range(0..=9)))
}

fn float(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let decimals = u32::try_from(args[0].int())
        .ok()
        .filter(|d| *d <= 15)
        .ok_or_else(|| FakerError::InvalidArgument {
            name: "Float".to_string(),
            index: 0,
            kind: "decimal count between 0 and 15".to_string(),
            value: args[0].int().to_string(),
        })?;
    let (a, b) = (args[1].float(), args[2].float());
    let (min, max) = if a <= b { (a, b) } else { (b, a) };
    if !(max - min).is_finite() {
        return Err(FakerError::InvalidArgument {
            name: "Float".to_string(),
            index: 2,
            kind: "finite float range".to_string(),
            value: format!("{}..{}", a, b),
        });
    }

    let value = if min == max {
        min
    } else {
        rng.random_range(min..=max)
    };
    let scale = 10f64.powi(decimals as i32);
    Ok(FakerValue::Float((value * scale).round() / scale))
}

fn replace_placeholders(
    template: &str,
    rng: &mut dyn RngCore,
    digits: bool,
    letters: bool,
) -> String {
    template
        .chars()
        .map(|c| match c {
            '#' if digits => char::from(b'0' + rng.random_range(0..10u8)),
            '?' if letters => char::from(b'a' + rng.random_range(0..26u8)),
            other => other,
        })
        .collect()
}

fn numerify(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    Ok(FakerValue::Text(replace_placeholders(
        args[0].text(),
        rng,
        true,
        false,
    )))
}

fn lexify(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    Ok(FakerValue::Text(replace_placeholders(
        args[0].text(),
        rng,
        false,
        true,
    )))
}

fn bothify(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    Ok(FakerValue::Text(replace_placeholders(
        args[0].text(),
        rng,
        true,
        true,
    )))
}

fn internet_domain(_: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let word: String = lorem::Word().fake_with_rng(rng);
    let suffix: String = internet::DomainSuffix().fake_with_rng(rng);
    Ok(FakerValue::Text(format!("{}.{}", word.to_lowercase(), suffix)))
}

fn lorem_words(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let n = count(args, "Lorem.Words")?;
    let words: Vec<String> = lorem::Words(n..n + 1).fake_with_rng(rng);
    Ok(FakerValue::List(words))
}

fn lorem_sentence(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let n = count(args, "Lorem.Sentence")?;
    Ok(FakerValue::Text(
        lorem::Sentence(n..n + 1).fake_with_rng::<String, _>(rng),
    ))
}

fn lorem_sentences(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let n = count(args, "Lorem.Sentences")?;
    let sentences: Vec<String> = lorem::Sentences(n..n + 1).fake_with_rng(rng);
    Ok(FakerValue::List(sentences))
}

fn lorem_paragraph(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let n = count(args, "Lorem.Paragraph")?;
    Ok(FakerValue::Text(
        lorem::Paragraph(n..n + 1).fake_with_rng::<String, _>(rng),
    ))
}

/// Text of at most `max` characters built from whole sentences, then words.
fn lorem_text(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let max = count(args, "Lorem.Text")?;
    let mut text = String::new();
    let mut len = 0usize;

    let fits = |len: usize, piece: &str| len + usize::from(len > 0) + piece.chars().count() <= max;

    // Bounded so tiny limits terminate even when no word fits.
    for _ in 0..max.max(1) {
        let sentence: String = lorem::Sentence(4..10).fake_with_rng(rng);
        let piece = if fits(len, &sentence) {
            sentence
        } else {
            let word: String = lorem::Word().fake_with_rng(rng);
            if !fits(len, &word) {
                break;
            }
            word
        };

        if len > 0 {
            text.push(' ');
            len += 1;
        }
        len += piece.chars().count();
        text.push_str(&piece);
    }

    Ok(FakerValue::Text(text))
}

fn boolean_bool(_: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    Ok(FakerValue::Bool(boolean::Boolean(50).fake_with_rng(rng)))
}

fn boolean_with_chance(args: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let chance = args[0].int().clamp(0, 100) as u8;
    Ok(FakerValue::Bool(boolean::Boolean(chance).fake_with_rng(rng)))
}

fn address_street_address(_: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let number: String = address::BuildingNumber().fake_with_rng(rng);
    let street: String = address::StreetName().fake_with_rng(rng);
    Ok(FakerValue::Text(format!("{} {}", number, street)))
}

/// RFC 4122 version 4 UUID from 16 random bytes.
fn uuid_v4(_: &[Arg], rng: &mut dyn RngCore) -> Result<FakerValue, FakerError> {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex = hex::encode(bytes);
    Ok(FakerValue::Text(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )))
}
