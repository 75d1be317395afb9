//! Class Catalog
//!
//! Registration-time tables replacing runtime reflection. Every class that
//! can appear in a call, as an endpoint, argument, result or reference, is
//! described once by a [`ClassDescriptor`] and registered in a
//! [`ClassCatalog`].
//!
//! # Lookup
//!
//! Call-time lookups go through [`ClassData`], an index of a class's members
//! grouped by `(name, arity)`. It is built lazily on first use, includes
//! instance methods inherited through the supertype chain, and is cached for
//! the life of the catalog. Arity counts wire parameters only.
//!
//! Within a `(name, arity)` group members keep their declaration order, own
//! members before inherited ones. Overload resolution relies on that order to
//! break ties.
//!
//! Bean field tables are merged the same way: every bean supertype
//! contributes its fields, and a field redeclared lower in the hierarchy
//! takes the subclass's type.

mod descriptor;


use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use dumborb_common::{DumborbError, Result, Type};

pub use descriptor::{ClassDescriptor, ClassKind, Invocation, Invoker, Member, Param};

type MemberIndex = HashMap<String, BTreeMap<usize, Vec<Member>>>;

fn index<'a>(members: impl Iterator<Item = &'a Member>) -> MemberIndex {
    let mut index = MemberIndex::new();
    for member in members {
        index
            .entry(member.name().to_string())
            .or_default()
            .entry(member.arity())
            .or_default()
            .push(member.clone());
    }
    index
}

fn lookup<'a>(index: &'a MemberIndex, name: &str, arity: usize) -> &'a [Member] {
    index
        .get(name)
        .and_then(|by_arity| by_arity.get(&arity))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Cached member index of one class.
#[derive(Debug)]
pub struct ClassData {
    name: Arc<str>,
    methods: MemberIndex,
    static_methods: MemberIndex,
    constructors: BTreeMap<usize, Vec<Member>>,
    fields: Option<BTreeMap<String, Type>>,
}

impl ClassData {
    fn build(catalog: &ClassCatalog, descriptor: &ClassDescriptor) -> Self {
        let mut methods: Vec<Member> = Vec::new();
        for class in catalog.ancestors(descriptor.name()) {
            let Some(ancestor) = catalog.descriptor(&class) else {
                continue;
            };
            for member in ancestor.methods() {
                if !methods.iter().any(|m| m.same_signature(member)) {
                    methods.push(member.clone());
                }
            }
        }

        let mut constructors: BTreeMap<usize, Vec<Member>> = BTreeMap::new();
        for member in descriptor.constructors() {
            constructors.entry(member.arity()).or_default().push(member.clone());
        }

        let fields = matches!(descriptor.kind(), ClassKind::Bean(_)).then(|| {
            let mut merged = BTreeMap::new();
            // Farthest ancestors first, so subclasses overwrite.
            for class in catalog.ancestors(descriptor.name()).iter().rev() {
                if let Some(ClassKind::Bean(own)) = catalog.descriptor(class).map(|d| d.kind().clone()) {
                    merged.extend(own);
                }
            }
            merged
        });

        Self {
            name: Arc::from(descriptor.name()),
            methods: index(methods.iter()),
            static_methods: index(descriptor.static_methods().iter()),
            constructors,
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance methods, own and inherited, with this name and arity.
    pub fn methods(&self, name: &str, arity: usize) -> &[Member] {
        lookup(&self.methods, name, arity)
    }

    pub fn static_methods(&self, name: &str, arity: usize) -> &[Member] {
        lookup(&self.static_methods, name, arity)
    }

    pub fn constructors(&self, arity: usize) -> &[Member] {
        self.constructors
            .get(&arity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Fields of a bean class, own and inherited. `None` for other kinds.
    pub fn fields(&self) -> Option<&BTreeMap<String, Type>> {
        self.fields.as_ref()
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn static_method_names(&self) -> impl Iterator<Item = &str> {
        self.static_methods.keys().map(String::as_str)
    }

    /// True if an instance method with the same name and parameters exists.
    pub fn declares(&self, member: &Member) -> bool {
        self.methods(member.name(), member.arity())
            .iter()
            .any(|m| m.same_signature(member))
    }
}

/// Process-wide table of class descriptors.
#[derive(Default)]
pub struct ClassCatalog {
    classes: RwLock<HashMap<Arc<str>, Arc<ClassDescriptor>>>,
    data: RwLock<HashMap<Arc<str>, Arc<ClassData>>>,
    // Bumped by every registration; an index built under an older
    // generation is returned but not cached.
    generation: AtomicU64,
}

impl ClassCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class descriptor.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Registration` if a class with the same name is
    /// already registered.
    pub fn register(&self, descriptor: ClassDescriptor) -> Result<()> {
        let name: Arc<str> = Arc::from(descriptor.name());
        {
            let mut classes = self.classes.write();
            if classes.contains_key(&name) {
                return Err(DumborbError::Registration(format!(
                    "class '{}' is already registered",
                    name
                )));
            }
            classes.insert(Arc::clone(&name), Arc::new(descriptor));
            // A new class may be a supertype of something already indexed.
            let mut data = self.data.write();
            self.generation.fetch_add(1, Ordering::SeqCst);
            data.clear();
        }
        tracing::debug!("registered class {}", name);
        Ok(())
    }

    pub fn descriptor(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// Member index of a class, built on first use.
    pub fn class_data(&self, name: &str) -> Option<Arc<ClassData>> {
        if let Some(data) = self.data.read().get(name) {
            return Some(Arc::clone(data));
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let descriptor = self.descriptor(name)?;
        let built = Arc::new(ClassData::build(self, &descriptor));
        let mut cache = self.data.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            return Some(built);
        }
        let data = cache
            .entry(Arc::from(name))
            .or_insert_with(|| Arc::clone(&built));
        Some(Arc::clone(data))
    }

    /// Fields of bean class `name`, own and inherited.
    pub fn bean_fields(&self, name: &str) -> Option<BTreeMap<String, Type>> {
        self.class_data(name).and_then(|data| data.fields().cloned())
    }

    /// The class itself followed by every transitive supertype, breadth first.
    ///
    /// Supertypes that were never registered are included but not expanded.
    pub fn ancestors(&self, name: &str) -> Vec<Arc<str>> {
        let mut order = Vec::new();
        let mut visited: HashSet<Arc<str>> = HashSet::new();
        let mut queue: VecDeque<Arc<str>> = VecDeque::from([Arc::from(name)]);
        while let Some(class) = queue.pop_front() {
            if !visited.insert(Arc::clone(&class)) {
                continue;
            }
            if let Some(descriptor) = self.descriptor(&class) {
                queue.extend(descriptor.supertypes().iter().cloned());
            }
            order.push(class);
        }
        order
    }

    /// True if a value of class `from` may be used where `to` is expected.
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        from == to || self.ancestors(from).iter().any(|class| &**class == to)
    }
}
