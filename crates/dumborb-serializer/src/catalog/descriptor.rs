use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dumborb_common::{AppError, FromValue, Type, Value};

/// Callable body of a member.
pub type Invoker = Arc<dyn Fn(Invocation) -> Result<Value, AppError> + Send + Sync>;

/// A declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Supplied by the caller on the wire
    Wire(Type),
    /// Supplied by the named local argument resolver from the call context;
    /// does not count towards arity
    Local(Arc<str>),
}

impl Param {
    pub fn local(resolver: &str) -> Self {
        Param::Local(Arc::from(resolver))
    }
}

/// A method, static method or constructor of a class.
#[derive(Clone)]
pub struct Member {
    name: Arc<str>,
    params: Vec<Param>,
    invoker: Option<Invoker>,
}

impl Member {
    /// Creates a member with an explicit parameter list.
    ///
    /// # Arguments
    ///
    /// * `name` - Member name as seen on the wire
    /// * `params` - Declared parameters, wire and local
    /// * `invoker` - Body; receives the receiver (for instance methods) and
    ///   every argument in declaration order
    pub fn new<F>(name: &str, params: Vec<Param>, invoker: F) -> Self
    where
        F: Fn(Invocation) -> Result<Value, AppError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            params,
            invoker: Some(Arc::new(invoker)),
        }
    }

    /// Creates a member whose parameters all come from the wire.
    pub fn with_types<F>(name: &str, types: Vec<Type>, invoker: F) -> Self
    where
        F: Fn(Invocation) -> Result<Value, AppError> + Send + Sync + 'static,
    {
        Self::new(name, types.into_iter().map(Param::Wire).collect(), invoker)
    }

    /// Creates a signature without a body, as declared by an interface.
    pub fn abstract_member(name: &str, types: Vec<Type>) -> Self {
        Self {
            name: Arc::from(name),
            params: types.into_iter().map(Param::Wire).collect(),
            invoker: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn wire_types(&self) -> impl Iterator<Item = &Type> {
        self.params.iter().filter_map(|p| match p {
            Param::Wire(ty) => Some(ty),
            Param::Local(_) => None,
        })
    }

    /// Number of wire parameters.
    pub fn arity(&self) -> usize {
        self.wire_types().count()
    }

    pub fn is_abstract(&self) -> bool {
        self.invoker.is_none()
    }

    pub fn same_signature(&self, other: &Member) -> bool {
        self.name == other.name && self.params == other.params
    }

    /// Human readable signature, e.g. `add(int, int)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match p {
                Param::Wire(ty) => ty.to_string(),
                Param::Local(name) => format!("<{}>", name),
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    /// Runs the member body.
    ///
    /// # Errors
    ///
    /// Returns whatever the body returns, or an `AppError` if the member is
    /// abstract.
    pub fn invoke(&self, invocation: Invocation) -> Result<Value, AppError> {
        match &self.invoker {
            Some(invoker) => (invoker.as_ref())(invocation),
            None => Err(AppError::new(format!(
                "{} has no implementation",
                self.signature()
            ))),
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Receiver and arguments handed to an invoker.
#[derive(Debug, Clone)]
pub struct Invocation {
    receiver: Option<Value>,
    args: Vec<Value>,
}

impl Invocation {
    pub fn new(receiver: Option<Value>, args: Vec<Value>) -> Self {
        Self { receiver, args }
    }

    pub fn receiver(&self) -> Option<&Value> {
        self.receiver.as_ref()
    }

    /// The receiver downcast to its Rust type.
    pub fn this<T: Any + Send + Sync>(&self) -> Result<Arc<T>, AppError> {
        self.receiver
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|instance| instance.downcast::<T>())
            .ok_or_else(|| AppError::new("receiver has an unexpected type"))
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Result<&Value, AppError> {
        self.args
            .get(index)
            .ok_or_else(|| AppError::new(format!("missing argument {}", index)))
    }

    /// Argument `index` converted to a Rust value.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T, AppError> {
        T::from_value(self.arg(index)?).map_err(AppError::from)
    }
}

/// What kind of class a descriptor describes.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassKind {
    /// Marshalled by value, field by field
    Bean(BTreeMap<String, Type>),
    /// Only usable by reference or as a method receiver
    Opaque,
    /// Declares abstract members; restricts visibility of registered objects
    Interface,
    /// Marshalled as its variant name
    Enum(Vec<String>),
}

/// Registration-time description of a class.
///
/// # Example
///
/// ```
/// use dumborb_common::{Type, Value};
/// use dumborb_serializer::{ClassDescriptor, Member};
///
/// let calc = ClassDescriptor::opaque("Calculator")
///     .static_method(Member::with_types("add", vec![Type::Int, Type::Int], |inv| {
///         Ok(Value::Int(inv.get::<i64>(0)? + inv.get::<i64>(1)?))
///     }));
/// assert_eq!(calc.static_methods().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    name: Arc<str>,
    kind: ClassKind,
    supertypes: Vec<Arc<str>>,
    constructors: Vec<Member>,
    methods: Vec<Member>,
    static_methods: Vec<Member>,
}

impl ClassDescriptor {
    fn with_kind(name: &str, kind: ClassKind) -> Self {
        Self {
            name: Arc::from(name),
            kind,
            supertypes: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            static_methods: Vec::new(),
        }
    }

    pub fn opaque(name: &str) -> Self {
        Self::with_kind(name, ClassKind::Opaque)
    }

    pub fn bean(name: &str) -> Self {
        Self::with_kind(name, ClassKind::Bean(BTreeMap::new()))
    }

    pub fn interface(name: &str) -> Self {
        Self::with_kind(name, ClassKind::Interface)
    }

    pub fn enumeration(name: &str, variants: &[&str]) -> Self {
        Self::with_kind(
            name,
            ClassKind::Enum(variants.iter().map(|v| v.to_string()).collect()),
        )
    }

    /// Adds a field. Only meaningful for beans; ignored otherwise.
    pub fn field(mut self, name: &str, ty: Type) -> Self {
        if let ClassKind::Bean(fields) = &mut self.kind {
            fields.insert(name.to_string(), ty);
        }
        self
    }

    /// Declares a direct supertype (superclass or interface).
    pub fn extends(mut self, supertype: &str) -> Self {
        self.supertypes.push(Arc::from(supertype));
        self
    }

    pub fn constructor(mut self, member: Member) -> Self {
        self.constructors.push(member);
        self
    }

    pub fn method(mut self, member: Member) -> Self {
        self.methods.push(member);
        self
    }

    pub fn static_method(mut self, member: Member) -> Self {
        self.static_methods.push(member);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    pub fn supertypes(&self) -> &[Arc<str>] {
        &self.supertypes
    }

    pub fn constructors(&self) -> &[Member] {
        &self.constructors
    }

    pub fn methods(&self) -> &[Member] {
        &self.methods
    }

    pub fn static_methods(&self) -> &[Member] {
        &self.static_methods
    }
}
