//! Solidity ABI support for the narrow call interface
//!
//! Contracts are only ever touched through their ABI:
//! - `InterfaceDescriptor` holds the callable surface of a deployed component
//! - JSON literals from plan manifests are coerced into typed tokens
//! - tokens are head/tail encoded into calldata, call outputs decoded back
//! - revert payloads (`Error(string)`, `Panic(uint256)`) are decoded to text

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{encode_hex, keccak256, Address, U256};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Selector of `Error(string)`
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// Selector of `Panic(uint256)`
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Parsed Solidity parameter type
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Bool,
    Uint(usize),
    Int(usize),
    FixedBytes(usize),
    Bytes,
    String,
    Array(Box<ParamType>),
    FixedArray(Box<ParamType>, usize),
    Tuple(Vec<ParamType>),
}

impl ParamType {
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::Bytes | ParamType::String | ParamType::Array(_) => true,
            ParamType::FixedArray(inner, _) => inner.is_dynamic(),
            ParamType::Tuple(items) => items.iter().any(ParamType::is_dynamic),
            _ => false,
        }
    }

    /// Bytes occupied in the head of an enclosing sequence
    fn head_size(&self) -> usize {
        if self.is_dynamic() {
            return 32;
        }
        match self {
            ParamType::FixedArray(inner, n) => inner.head_size() * n,
            ParamType::Tuple(items) => items.iter().map(ParamType::head_size).sum(),
            _ => 32,
        }
    }
}

/// Typed ABI value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Bool(bool),
    Uint(U256),
    /// Two's complement representation
    Int(U256),
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
    Array(Vec<Token>),
    FixedArray(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        match self {
            Token::Bytes(_) | Token::String(_) | Token::Array(_) => true,
            Token::FixedArray(items) | Token::Tuple(items) => items.iter().any(Token::is_dynamic),
            _ => false,
        }
    }
}

/// One input/output parameter of an ABI item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<AbiParam>,
    #[serde(
        rename = "internalType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub internal_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
}

impl AbiParam {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            components: Vec::new(),
            internal_type: None,
            indexed: None,
        }
    }

    pub fn tuple(name: &str, components: Vec<AbiParam>) -> Self {
        Self {
            components,
            ..Self::new(name, "tuple")
        }
    }

    pub fn param_type(&self) -> Result<ParamType, String> {
        parse_type(&self.kind, &self.components)
    }

    /// Canonical type string used in function signatures
    pub fn canonical(&self) -> String {
        match self.kind.strip_prefix("tuple") {
            Some(suffix) => {
                let inner: Vec<String> = self.components.iter().map(AbiParam::canonical).collect();
                format!("({}){}", inner.join(","), suffix)
            }
            None => self.kind.clone(),
        }
    }
}

fn parse_type(kind: &str, components: &[AbiParam]) -> Result<ParamType, String> {
    if let Some(stripped) = kind.strip_suffix(']') {
        let open = stripped
            .rfind('[')
            .ok_or_else(|| format!("malformed array type '{}'", kind))?;
        let inner = Box::new(parse_type(&stripped[..open], components)?);
        let size = &stripped[open + 1..];
        if size.is_empty() {
            return Ok(ParamType::Array(inner));
        }
        let n = size
            .parse()
            .map_err(|_| format!("malformed array size in '{}'", kind))?;
        return Ok(ParamType::FixedArray(inner, n));
    }

    match kind {
        "address" => Ok(ParamType::Address),
        "bool" => Ok(ParamType::Bool),
        "string" => Ok(ParamType::String),
        "bytes" => Ok(ParamType::Bytes),
        "uint" => Ok(ParamType::Uint(256)),
        "int" => Ok(ParamType::Int(256)),
        "tuple" => components
            .iter()
            .map(AbiParam::param_type)
            .collect::<Result<Vec<_>, _>>()
            .map(ParamType::Tuple),
        _ => {
            if let Some(bits) = kind.strip_prefix("uint") {
                parse_bits(kind, bits).map(ParamType::Uint)
            } else if let Some(bits) = kind.strip_prefix("int") {
                parse_bits(kind, bits).map(ParamType::Int)
            } else if let Some(len) = kind.strip_prefix("bytes") {
                match len.parse::<usize>() {
                    Ok(n) if (1..=32).contains(&n) => Ok(ParamType::FixedBytes(n)),
                    _ => Err(format!("unsupported type '{}'", kind)),
                }
            } else {
                Err(format!("unsupported type '{}'", kind))
            }
        }
    }
}

fn parse_bits(kind: &str, bits: &str) -> Result<usize, String> {
    match bits.parse::<usize>() {
        Ok(n) if n % 8 == 0 && (8..=256).contains(&n) => Ok(n),
        _ => Err(format!("unsupported type '{}'", kind)),
    }
}

/// One entry of a contract ABI (function, constructor, event, error...)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbiItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<AbiParam>,
    #[serde(
        rename = "stateMutability",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub state_mutability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous: Option<bool>,
}

impl AbiItem {
    pub fn function(name: &str, inputs: Vec<AbiParam>, outputs: Vec<AbiParam>) -> Self {
        Self {
            kind: "function".to_string(),
            name: Some(name.to_string()),
            inputs,
            outputs,
            state_mutability: Some("nonpayable".to_string()),
            anonymous: None,
        }
    }

    pub fn constructor(inputs: Vec<AbiParam>) -> Self {
        Self {
            kind: "constructor".to_string(),
            name: None,
            inputs,
            outputs: Vec::new(),
            state_mutability: Some("nonpayable".to_string()),
            anonymous: None,
        }
    }

    pub fn payable(mut self) -> Self {
        self.state_mutability = Some("payable".to_string());
        self
    }

    pub fn view(mut self) -> Self {
        self.state_mutability = Some("view".to_string());
        self
    }

    /// `name(type,type)` canonical signature
    pub fn signature(&self) -> String {
        let inputs: Vec<String> = self.inputs.iter().map(AbiParam::canonical).collect();
        format!("{}({})", self.name.as_deref().unwrap_or_default(), inputs.join(","))
    }

    pub fn selector(&self) -> [u8; 4] {
        selector(&self.signature())
    }

    /// Encode calldata for this function from JSON arguments
    pub fn encode_call(&self, args: &[Value]) -> OrchestratorResult<Vec<u8>> {
        let mut data = self.selector().to_vec();
        data.extend(encode_params(&self.inputs, args).map_err(|e| {
            OrchestratorError::Abi(format!("{}: {}", self.signature(), e))
        })?);
        Ok(data)
    }

    /// Decode return data into JSON values, one per output
    pub fn decode_output(&self, data: &[u8]) -> OrchestratorResult<Vec<Value>> {
        decode_params(&self.outputs, data)
            .map_err(|e| OrchestratorError::Abi(format!("{} output: {}", self.signature(), e)))
    }
}

/// Callable surface of a deployed component, carried forward as data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDescriptor {
    pub contract_name: String,
    pub abi: Vec<AbiItem>,
}

impl InterfaceDescriptor {
    pub fn new(contract_name: &str, abi: Vec<AbiItem>) -> Self {
        Self {
            contract_name: contract_name.to_string(),
            abi,
        }
    }

    pub fn constructor_inputs(&self) -> &[AbiParam] {
        self.abi
            .iter()
            .find(|item| item.kind == "constructor")
            .map(|item| item.inputs.as_slice())
            .unwrap_or(&[])
    }

    pub fn functions(&self) -> impl Iterator<Item = &AbiItem> {
        self.abi.iter().filter(|item| item.kind == "function")
    }

    /// Look up a function by bare name (`approve`) or full signature
    /// (`approve(address,uint256)`). Overloads are disambiguated by arity.
    pub fn function(&self, name: &str, arity: usize) -> OrchestratorResult<&AbiItem> {
        let by_signature = name.contains('(');
        let candidates: Vec<&AbiItem> = self
            .functions()
            .filter(|item| {
                if by_signature {
                    item.signature() == name
                } else {
                    item.name.as_deref() == Some(name)
                }
            })
            .collect();

        match candidates.as_slice() {
            [] => Err(OrchestratorError::Abi(format!(
                "{} has no function '{}'",
                self.contract_name, name
            ))),
            [only] => Ok(*only),
            many => many
                .iter()
                .find(|item| item.inputs.len() == arity)
                .copied()
                .ok_or_else(|| {
                    OrchestratorError::Abi(format!(
                        "{}.{} has no overload taking {} argument(s)",
                        self.contract_name, name, arity
                    ))
                }),
        }
    }

    /// Encode constructor arguments (appended to the creation bytecode)
    pub fn encode_constructor(&self, args: &[Value]) -> OrchestratorResult<Vec<u8>> {
        encode_params(self.constructor_inputs(), args).map_err(|e| {
            OrchestratorError::Abi(format!("{} constructor: {}", self.contract_name, e))
        })
    }
}

/// Interfaces of deployed components, keyed by unit name
pub type InterfaceSet = IndexMap<String, InterfaceDescriptor>;

/// First four bytes of the keccak-256 of a signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Coerce JSON arguments against parameters and encode them as a sequence
pub fn encode_params(params: &[AbiParam], args: &[Value]) -> Result<Vec<u8>, String> {
    if params.len() != args.len() {
        return Err(format!(
            "expected {} argument(s), got {}",
            params.len(),
            args.len()
        ));
    }
    let tokens = params
        .iter()
        .zip(args)
        .map(|(param, value)| {
            let ty = param.param_type()?;
            coerce(&ty, &param.components, value)
                .map_err(|e| format!("argument '{}': {}", param.name, e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(encode(&tokens))
}

/// Decode a sequence and render it as JSON, one value per parameter
pub fn decode_params(params: &[AbiParam], data: &[u8]) -> Result<Vec<Value>, String> {
    let types = params
        .iter()
        .map(AbiParam::param_type)
        .collect::<Result<Vec<_>, _>>()?;
    let tokens = decode(&types, data)?;
    Ok(params
        .iter()
        .zip(tokens.iter())
        .map(|(param, token)| to_json(&param.components, token))
        .collect())
}

// ==================== Encoding ====================

fn word(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

fn padded(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    let rem = out.len() % 32;
    if rem != 0 {
        out.resize(out.len() + 32 - rem, 0);
    }
    out
}

fn static_size(token: &Token) -> usize {
    match token {
        Token::FixedArray(items) | Token::Tuple(items) => items.iter().map(static_size).sum(),
        _ => 32,
    }
}

/// Head/tail encode a sequence of tokens
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let heads_len: usize = tokens
        .iter()
        .map(|t| if t.is_dynamic() { 32 } else { static_size(t) })
        .sum();

    let mut head = Vec::with_capacity(heads_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&word(U256::from(heads_len + tail.len())));
            tail.extend(encode_token(token));
        } else {
            head.extend(encode_token(token));
        }
    }
    head.extend(tail);
    head
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Address(addr) => {
            let mut out = vec![0u8; 12];
            out.extend_from_slice(addr.as_bytes());
            out
        }
        Token::Bool(b) => word(U256::from(*b as u8)).to_vec(),
        Token::Uint(v) | Token::Int(v) => word(*v).to_vec(),
        Token::FixedBytes(bytes) => padded(bytes),
        Token::Bytes(bytes) => {
            let mut out = word(U256::from(bytes.len())).to_vec();
            out.extend(padded(bytes));
            out
        }
        Token::String(s) => encode_token(&Token::Bytes(s.as_bytes().to_vec())),
        Token::Array(items) => {
            let mut out = word(U256::from(items.len())).to_vec();
            out.extend(encode(items));
            out
        }
        Token::FixedArray(items) | Token::Tuple(items) => encode(items),
    }
}

// ==================== Decoding ====================

fn read_word(data: &[u8], at: usize) -> Result<&[u8], String> {
    data.get(at..at + 32)
        .ok_or_else(|| format!("output truncated at offset {}", at))
}

fn read_usize(data: &[u8], at: usize) -> Result<usize, String> {
    let value = U256::from_big_endian(read_word(data, at)?);
    if value > U256::from(data.len()) {
        return Err(format!("offset/length {} out of bounds", value));
    }
    Ok(value.as_usize())
}

/// Decode a head/tail encoded sequence
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, String> {
    decode_sequence(types, data, 0)
}

fn decode_sequence(types: &[ParamType], data: &[u8], base: usize) -> Result<Vec<Token>, String> {
    let mut offset = base;
    let mut out = Vec::with_capacity(types.len());
    for ty in types {
        if ty.is_dynamic() {
            let ptr = read_usize(data, offset)?;
            out.push(decode_value(ty, data, base + ptr)?);
            offset += 32;
        } else {
            out.push(decode_value(ty, data, offset)?);
            offset += ty.head_size();
        }
    }
    Ok(out)
}

fn decode_value(ty: &ParamType, data: &[u8], at: usize) -> Result<Token, String> {
    match ty {
        ParamType::Address => {
            let w = read_word(data, at)?;
            Ok(Token::Address(Address::from_slice(&w[12..]).unwrap_or_default()))
        }
        ParamType::Bool => Ok(Token::Bool(!U256::from_big_endian(read_word(data, at)?).is_zero())),
        ParamType::Uint(_) => Ok(Token::Uint(U256::from_big_endian(read_word(data, at)?))),
        ParamType::Int(_) => Ok(Token::Int(U256::from_big_endian(read_word(data, at)?))),
        ParamType::FixedBytes(n) => Ok(Token::FixedBytes(read_word(data, at)?[..*n].to_vec())),
        ParamType::Bytes | ParamType::String => {
            let len = read_usize(data, at)?;
            let bytes = data
                .get(at + 32..at + 32 + len)
                .ok_or_else(|| format!("bytes of length {} truncated", len))?
                .to_vec();
            if *ty == ParamType::String {
                String::from_utf8(bytes)
                    .map(Token::String)
                    .map_err(|e| format!("invalid utf-8 string: {}", e))
            } else {
                Ok(Token::Bytes(bytes))
            }
        }
        ParamType::Array(inner) => {
            let len = read_usize(data, at)?;
            let types = vec![(**inner).clone(); len];
            decode_sequence(&types, data, at + 32).map(Token::Array)
        }
        ParamType::FixedArray(inner, n) => {
            let types = vec![(**inner).clone(); *n];
            decode_sequence(&types, data, at).map(Token::FixedArray)
        }
        ParamType::Tuple(items) => decode_sequence(items, data, at).map(Token::Tuple),
    }
}

// ==================== JSON coercion ====================

/// Parse an unsigned amount: plain decimal, `0x` hex, or `<decimal> <unit>`
/// where unit is one of `wei`, `gwei`, `ether`.
pub fn parse_amount(text: &str) -> Result<U256, String> {
    let text = text.trim();
    let mut parts = text.split_whitespace();
    let number = parts.next().ok_or_else(|| "empty amount".to_string())?;
    let decimals = match parts.next() {
        None | Some("wei") => 0,
        Some("gwei") => 9,
        Some("ether") | Some("eth") => 18,
        Some(unit) => return Err(format!("unknown unit '{}'", unit)),
    };
    if parts.next().is_some() {
        return Err(format!("malformed amount '{}'", text));
    }

    if let Some(hex) = number.strip_prefix("0x") {
        if decimals != 0 {
            return Err(format!("hex amount '{}' cannot carry a unit", text));
        }
        return U256::from_str_radix(hex, 16).map_err(|_| format!("invalid hex amount '{}'", text));
    }

    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if frac.len() > decimals {
        return Err(format!("amount '{}' has too many decimals", text));
    }
    let digits = format!("{}{}{}", whole, frac, "0".repeat(decimals - frac.len()));
    U256::from_dec_str(&digits).map_err(|_| format!("invalid amount '{}'", text))
}

fn coerce_uint(value: &Value, bits: usize) -> Result<U256, String> {
    let n = match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("{} is not an unsigned integer", n))?,
        Value::String(s) => parse_amount(s)?,
        other => return Err(format!("expected unsigned integer, got {}", other)),
    };
    if bits < 256 && n >= U256::one() << bits {
        return Err(format!("{} does not fit in uint{}", value, bits));
    }
    Ok(n)
}

fn coerce_int(value: &Value, bits: usize) -> Result<U256, String> {
    let limit = U256::one() << (bits - 1);
    match value.as_i64() {
        Some(v) if v < 0 => {
            if U256::from(v.unsigned_abs()) > limit {
                return Err(format!("{} does not fit in int{}", value, bits));
            }
            Ok(!U256::from(v.unsigned_abs() - 1))
        }
        _ => {
            let n = coerce_uint(value, 256)?;
            if bits < 256 && n >= limit {
                return Err(format!("{} does not fit in int{}", value, bits));
            }
            Ok(n)
        }
    }
}

fn coerce_bytes(value: &Value) -> Result<Vec<u8>, String> {
    match value {
        Value::String(s) => crate::types::decode_hex(s),
        other => Err(format!("expected hex string, got {}", other)),
    }
}

/// Coerce a JSON literal into a token of the given type
pub fn coerce(ty: &ParamType, components: &[AbiParam], value: &Value) -> Result<Token, String> {
    match ty {
        ParamType::Address => match value {
            Value::String(s) => s.parse().map(Token::Address),
            other => Err(format!("expected address string, got {}", other)),
        },
        ParamType::Bool => match value {
            Value::Bool(b) => Ok(Token::Bool(*b)),
            Value::String(s) if s == "true" => Ok(Token::Bool(true)),
            Value::String(s) if s == "false" => Ok(Token::Bool(false)),
            other => Err(format!("expected bool, got {}", other)),
        },
        ParamType::Uint(bits) => coerce_uint(value, *bits).map(Token::Uint),
        ParamType::Int(bits) => coerce_int(value, *bits).map(Token::Int),
        ParamType::FixedBytes(n) => {
            let bytes = coerce_bytes(value)?;
            if bytes.len() != *n {
                return Err(format!("expected {} bytes, got {}", n, bytes.len()));
            }
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::Bytes => coerce_bytes(value).map(Token::Bytes),
        ParamType::String => match value {
            Value::String(s) => Ok(Token::String(s.clone())),
            other => Ok(Token::String(other.to_string())),
        },
        ParamType::Array(inner) => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("expected array, got {}", value))?;
            items
                .iter()
                .map(|item| coerce(inner, components, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::Array)
        }
        ParamType::FixedArray(inner, n) => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("expected array, got {}", value))?;
            if items.len() != *n {
                return Err(format!("expected {} elements, got {}", n, items.len()));
            }
            items
                .iter()
                .map(|item| coerce(inner, components, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::FixedArray)
        }
        ParamType::Tuple(types) => {
            let values: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                Value::Object(map) => components
                    .iter()
                    .map(|c| {
                        map.get(&c.name)
                            .ok_or_else(|| format!("missing tuple field '{}'", c.name))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                other => return Err(format!("expected tuple, got {}", other)),
            };
            if values.len() != types.len() {
                return Err(format!(
                    "expected {} tuple fields, got {}",
                    types.len(),
                    values.len()
                ));
            }
            types
                .iter()
                .zip(components.iter().map(|c| c.components.as_slice()).chain(std::iter::repeat(&[][..])))
                .zip(values)
                .map(|((ty, comps), v)| coerce(ty, comps, v))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::Tuple)
        }
    }
}

/// Render a token as JSON. Integers become decimal strings; tuples with
/// fully named components become objects.
pub fn to_json(components: &[AbiParam], token: &Token) -> Value {
    match token {
        Token::Address(addr) => Value::String(addr.to_checksum()),
        Token::Bool(b) => Value::Bool(*b),
        Token::Uint(v) => Value::String(v.to_string()),
        Token::Int(v) => {
            if v.bit(255) {
                let magnitude = (!*v).overflowing_add(U256::one()).0;
                Value::String(format!("-{}", magnitude))
            } else {
                Value::String(v.to_string())
            }
        }
        Token::FixedBytes(bytes) | Token::Bytes(bytes) => Value::String(encode_hex(bytes)),
        Token::String(s) => Value::String(s.clone()),
        Token::Array(items) | Token::FixedArray(items) => {
            Value::Array(items.iter().map(|t| to_json(components, t)).collect())
        }
        Token::Tuple(items) => {
            let named = components.len() == items.len()
                && components.iter().all(|c| !c.name.is_empty());
            if named {
                Value::Object(
                    components
                        .iter()
                        .zip(items)
                        .map(|(c, t)| (c.name.clone(), to_json(&c.components, t)))
                        .collect(),
                )
            } else {
                Value::Array(items.iter().map(|t| to_json(&[], t)).collect())
            }
        }
    }
}

/// Human-readable reason from revert data
pub fn decode_revert(data: &[u8]) -> String {
    if data.is_empty() {
        return "execution reverted without a reason".to_string();
    }
    if data.len() >= 4 && data[..4] == ERROR_SELECTOR {
        if let Ok(tokens) = decode(&[ParamType::String], &data[4..]) {
            if let Some(Token::String(reason)) = tokens.into_iter().next() {
                return reason;
            }
        }
    }
    if data.len() >= 4 && data[..4] == PANIC_SELECTOR {
        if let Ok(word) = read_word(&data[4..], 0) {
            return format!("panic code {:#x}", U256::from_big_endian(word));
        }
    }
    if data.len() >= 4 {
        return format!("custom error {}", encode_hex(&data[..4]));
    }
    format!("malformed revert data {}", encode_hex(data))
}
