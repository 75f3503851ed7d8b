//! Tools: named, schema-described callables the model may ask to invoke.
//!
//! A tool is registered once from a plain function over an argument record.
//! Registration captures three steps, erased behind one invoker:
//!
//! 1. a JSON decoder into the record type ([`serde`]),
//! 2. the record's validator ([`ToolArgs::validate`]),
//! 3. the callable itself.
//!
//! The model-facing schema is a pure function of the record's field
//! descriptors ([`ToolArgs::fields`]), so two registrations over the same
//! record always produce the same [`ToolDefinition`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ToolError};
use crate::message::ToolCall;
use crate::provider::ToolDefinition;

/// JSON-schema scalar type of a tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldKind {
    /// Map a Rust scalar type name to its schema kind.
    ///
    /// Anything that is not an integer, float or `bool` maps to `String`.
    pub fn from_type_name(type_name: &str) -> Self {
        let compact: String = type_name.chars().filter(|c| !c.is_whitespace()).collect();
        let last = compact.rsplit("::").next().unwrap_or(&compact);
        match last {
            "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
            | "u128" | "usize" => FieldKind::Integer,
            "f32" | "f64" => FieldKind::Number,
            "bool" => FieldKind::Boolean,
            _ => FieldKind::String,
        }
    }
}

/// Descriptor for one field of a tool's argument record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// External (JSON) name of the property
    pub name: String,
    pub kind: FieldKind,
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn describe_opt(mut self, description: Option<&str>) -> Self {
        self.description = description.map(String::from);
        self
    }
}

/// Schema of a single property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: FieldKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// JSON-schema object describing a tool's parameters.
///
/// Properties are flat scalars and every property is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,

    pub properties: BTreeMap<String, PropertySchema>,

    /// Property names in declaration order
    pub required: Vec<String>,
}

impl ParameterSchema {
    /// Derive the schema from a field descriptor list.
    pub fn from_fields(fields: &[FieldSpec]) -> Self {
        let mut properties = BTreeMap::new();
        let mut required = Vec::with_capacity(fields.len());
        for field in fields {
            properties.insert(
                field.name.clone(),
                PropertySchema {
                    kind: field.kind,
                    description: field.description.clone(),
                },
            );
            required.push(field.name.clone());
        }
        Self {
            schema_type: "object".into(),
            properties,
            required,
        }
    }
}

/// Reject descriptor lists that cannot form a valid flat schema.
fn check_fields(fields: &[FieldSpec]) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            return Err("argument field with an empty name".into());
        }
        if !seen.insert(field.name.as_str()) {
            return Err(format!("duplicate argument field '{}'", field.name));
        }
    }
    Ok(())
}

/// An argument record a tool can be registered over.
///
/// Usually implemented with [`tool_args!`](crate::tool_args), which also
/// derives `Deserialize` with matching field names.
pub trait ToolArgs: DeserializeOwned + Send + 'static {
    /// Field descriptors in declaration order.
    fn fields() -> Vec<FieldSpec>;

    /// Semantic checks run after decoding and before invocation.
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Return shapes a tool callable may have.
///
/// `Result<String, E>` yields its text; `Result<(), E>` yields empty text.
/// An error always wins.
pub trait ToolOutput {
    fn into_output(self) -> std::result::Result<String, String>;
}

impl<E: Display> ToolOutput for std::result::Result<String, E> {
    fn into_output(self) -> std::result::Result<String, String> {
        self.map_err(|e| e.to_string())
    }
}

impl<E: Display> ToolOutput for std::result::Result<(), E> {
    fn into_output(self) -> std::result::Result<String, String> {
        self.map(|()| String::new()).map_err(|e| e.to_string())
    }
}

type Invoker =
    Box<dyn Fn(&str) -> BoxFuture<'static, std::result::Result<String, ToolError>> + Send + Sync>;

/// A registered tool.
pub struct Tool {
    name: String,
    description: String,
    definition: ToolDefinition,
    invoker: Invoker,
}

impl Tool {
    /// Register a synchronous callable.
    pub fn new<A, F, R>(name: impl Into<String>, description: impl Into<String>, callable: F) -> Result<Self>
    where
        A: ToolArgs,
        F: Fn(A) -> R + Send + Sync + 'static,
        R: ToolOutput + Send + 'static,
    {
        Self::new_async(name, description, move |args: A| {
            let output = callable(args);
            async move { output }
        })
    }

    /// Register an async callable.
    pub fn new_async<A, F, Fut, R>(
        name: impl Into<String>,
        description: impl Into<String>,
        callable: F,
    ) -> Result<Self>
    where
        A: ToolArgs,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: ToolOutput,
    {
        let name = name.into();
        let description = description.into();
        if name.trim().is_empty() {
            return Err(Error::config("tool name must not be empty"));
        }

        let fields = A::fields();
        check_fields(&fields).map_err(|reason| Error::config(format!("tool '{name}': {reason}")))?;

        let definition = ToolDefinition {
            name: name.clone(),
            description: description.clone(),
            parameters: ParameterSchema::from_fields(&fields),
        };

        let tool_name = name.clone();
        let invoker: Invoker = Box::new(move |raw: &str| -> BoxFuture<'static, std::result::Result<String, ToolError>> {
            let args = match decode::<A>(&tool_name, raw) {
                Ok(args) => args,
                Err(e) => return Box::pin(futures::future::ready(Err(e))),
            };
            let pending = callable(args);
            let tool_name = tool_name.clone();
            Box::pin(async move {
                pending
                    .await
                    .into_output()
                    .map_err(|reason| ToolError::ExecutionFailed { tool_name, reason })
            })
        });

        Ok(Self {
            name,
            description,
            definition,
            invoker,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Decode `arguments` (raw JSON text), validate, and invoke.
    pub async fn call(&self, arguments: &str) -> std::result::Result<String, ToolError> {
        (self.invoker)(arguments).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

fn decode<A: ToolArgs>(tool_name: &str, raw: &str) -> std::result::Result<A, ToolError> {
    // Models send an empty string for argument-less calls.
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    let args: A = serde_json::from_str(raw).map_err(|e| ToolError::ArgumentParse {
        tool_name: tool_name.to_string(),
        reason: e.to_string(),
    })?;
    args.validate().map_err(|reason| ToolError::InvalidArguments {
        tool_name: tool_name.to_string(),
        reason,
    })?;
    Ok(args)
}

/// An ordered registry of tools, keyed by unique name.
///
/// Definitions are always produced in registration order so the provider
/// sees the same tool list on every call.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from tools, rejecting duplicate names.
    pub fn from_tools(tools: impl IntoIterator<Item = Tool>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool. A second tool with the same name is a configuration error.
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if self.index.contains_key(tool.name()) {
            return Err(Error::config(format!(
                "tool '{}' is already registered",
                tool.name()
            )));
        }
        self.index.insert(tool.name().to_string(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<String, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.call(&call.arguments).await
    }
}

/// Declare a tool argument record.
///
/// Generates the struct (deriving `serde::Deserialize`, so the calling crate
/// needs `serde`) together with its [`ToolArgs`] implementation. Each field
/// may carry an external name (`as "name"`) and a description (`=> "text"`).
///
/// ```
/// use tether_core::tool_args;
///
/// tool_args! {
///     #[derive(Debug)]
///     pub struct CalculatorArgs {
///         pub a: i64 => "The first number",
///         pub b: i64 as "second" => "The second number",
///     }
/// }
/// ```
#[macro_export]
macro_rules! tool_args {
    (@name $field:ident $rename:literal) => { $rename };
    (@name $field:ident) => { stringify!($field) };
    (@desc $desc:literal) => { ::std::option::Option::Some($desc) };
    (@desc) => { ::std::option::Option::None };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty $(as $rename:literal)? $(=> $desc:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(::serde::Deserialize)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $(#[serde(rename = $rename)])?
                $fvis $field: $fty,
            )*
        }

        impl $crate::tool::ToolArgs for $name {
            fn fields() -> ::std::vec::Vec<$crate::tool::FieldSpec> {
                ::std::vec![
                    $(
                        $crate::tool::FieldSpec::new(
                            $crate::tool_args!(@name $field $($rename)?),
                            $crate::tool::FieldKind::from_type_name(stringify!($fty)),
                        )
                        .describe_opt($crate::tool_args!(@desc $($desc)?)),
                    )*
                ]
            }
        }
    };
}
