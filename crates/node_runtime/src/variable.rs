//! Scoped variables and their resolution.
//!
//! A variable names where its value lives: in the current message
//! (`Message`), in the variable itself (`Custom`), or in a scope the host
//! owns (`Global`, `Flow`, ...).

use std::{fmt, marker::PhantomData};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::{
    context::Context,
    error::{Error, Result},
    lmo::is_reference,
    message::VariableRef,
    runtime::Runtime,
    value::HostValue,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Scope {
    Message,
    Custom,
    /// Any scope stored by the host.
    Host(String),
}

impl From<String> for Scope {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Message" => Scope::Message,
            "Custom" => Scope::Custom,
            _ => Scope::Host(s),
        }
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Message => f.write_str("Message"),
            Scope::Custom => f.write_str("Custom"),
            Scope::Host(s) => f.write_str(s),
        }
    }
}

/// `name` is a message path, a host variable name, or for `Custom` the
/// value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub scope: Scope,
    #[serde(default)]
    pub name: Value,
}

impl Variable {
    pub fn new(scope: Scope, name: impl Into<Value>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    pub fn message(path: &str) -> Self {
        Self::new(Scope::Message, path)
    }

    pub fn custom(value: impl Into<Value>) -> Self {
        Self::new(Scope::Custom, value)
    }

    /// The name as text; non-string names use their JSON form.
    pub fn name_str(&self) -> String {
        match &self.name {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn host_ref(&self, payload: Vec<u8>) -> VariableRef {
        VariableRef {
            scope: self.scope.to_string(),
            name: self.name_str(),
            payload,
        }
    }
}

/// Reads and writes [`Variable`]s against a message and the host.
pub struct VariableResolver<'a> {
    rt: &'a Runtime,
}

impl<'a> VariableResolver<'a> {
    pub fn new(rt: &'a Runtime) -> Self {
        Self { rt }
    }

    /// A missing message path resolves to `null`. Host scopes need the host
    /// channel and fail with [`Error::RuntimeNotReady`] without it.
    pub async fn get(&self, variable: &Variable, ctx: &dyn Context) -> Result<Value> {
        match &variable.scope {
            Scope::Custom => Ok(variable.name.clone()),
            Scope::Message => {
                let value = ctx.get(&variable.name_str()).unwrap_or(Value::Null);
                if !is_reference(&value) {
                    return Ok(value);
                }
                let store = self.rt.lmo_store().await;
                if !store.is_enabled() {
                    return Ok(value);
                }
                debug!(path = %variable.name_str(), "resolving large message object");
                store.resolve(&value)
            }
            Scope::Host(_) => {
                let host = self.rt.host()?;
                let payload = ctx.get_raw(&[])?;
                let value = host.get_variable(variable.host_ref(payload)).await?;
                Ok(value.into_json())
            }
        }
    }

    /// Writing to `Custom` does nothing: it has no storage.
    pub async fn set(
        &self,
        variable: &Variable,
        ctx: &mut dyn Context,
        value: Value,
    ) -> Result<()> {
        match &variable.scope {
            Scope::Custom => {
                debug!("ignoring write to a Custom variable");
                Ok(())
            }
            Scope::Message => {
                let store = self.rt.lmo_store().await;
                let value = match store.serialize(&value)? {
                    Some(lmo) => lmo.to_reference(),
                    None => value,
                };
                ctx.set(&variable.name_str(), value);
                Ok(())
            }
            Scope::Host(_) => {
                let host = self.rt.host()?;
                host.set_variable(variable.host_ref(Vec::new()), HostValue::from(value))
                    .await
            }
        }
    }
}

macro_rules! typed_variable {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name<T> {
            pub scope: Scope,
            #[serde(default)]
            pub name: Value,
            #[serde(skip)]
            _marker: PhantomData<fn() -> T>,
        }

        impl<T> $name<T> {
            pub fn new(scope: Scope, name: impl Into<Value>) -> Self {
                Self {
                    scope,
                    name: name.into(),
                    _marker: PhantomData,
                }
            }

            pub fn variable(&self) -> Variable {
                Variable {
                    scope: self.scope.clone(),
                    name: self.name.clone(),
                }
            }
        }
    };
}

typed_variable!(
    /// A node input read through the resolver.
    InVariable
);
typed_variable!(
    /// A node output written through the resolver.
    OutVariable
);
typed_variable!(
    /// An input that may be absent.
    OptVariable
);

fn decode<T: DeserializeOwned>(variable: &Variable, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        Error::Serialization(format!(
            "variable `{}` ({}): {e}",
            variable.name_str(),
            variable.scope
        ))
    })
}

impl<T: DeserializeOwned> InVariable<T> {
    pub async fn get(&self, ctx: &dyn Context, rt: &Runtime) -> Result<T> {
        let variable = self.variable();
        let value = rt.resolver().get(&variable, ctx).await?;
        decode(&variable, value)
    }
}

impl<T: DeserializeOwned> OptVariable<T> {
    /// `None` when the variable is empty.
    pub async fn get(&self, ctx: &dyn Context, rt: &Runtime) -> Result<Option<T>> {
        let variable = self.variable();
        match rt.resolver().get(&variable, ctx).await? {
            Value::Null => Ok(None),
            value => decode(&variable, value).map(Some),
        }
    }
}

impl<T: Serialize> OutVariable<T> {
    pub async fn set(&self, ctx: &mut dyn Context, rt: &Runtime, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        rt.resolver().set(&self.variable(), ctx, value).await
    }
}
