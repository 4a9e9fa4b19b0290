//! A small interpreter for environment-guarded inline scripts.
//!
//! Handles the straight-line subset such blocks are written in: conditionals,
//! variable bindings, string and number arithmetic, and the handful of DOM
//! calls used to emit markup. Anything else is reported as unsupported.

use oxc::allocator::Allocator;
use oxc::ast::ast::{
    AssignmentTarget, Expression, Program, Statement, StaticMemberExpression, TemplateLiteral,
    VariableDeclaration, VariableDeclarationKind,
};
use oxc::parser::Parser;
use oxc::span::{GetSpan, SourceType, Span};
use oxc::syntax::operator::{AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator};
use rustc_hash::FxHashMap;

use crate::html::NodeId;

/// Document operations a script may perform.
pub trait DomHost {
    /// `document.write` output, in call order.
    fn write(&mut self, html: &str);
    fn create_element(&mut self, tag: &str) -> NodeId;
    fn append_child(&mut self, parent: NodeId, child: Child) -> Result<(), String>;
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), String>;
    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String>;
    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), String>;
    fn set_inner_html(&mut self, node: NodeId, html: &str) -> Result<(), String>;
    fn text(&self, node: NodeId) -> Option<String>;
    fn body(&self) -> Option<NodeId>;
    fn head(&self) -> Option<NodeId>;
    fn element_by_id(&self, id: &str) -> Option<NodeId>;
}

/// A node handed to `appendChild`.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Element(NodeId),
    Text(String),
}

/// Runtime values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Element(NodeId),
    TextNode(String),
    Document,
    Window,
    Console,
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Null | Self::Element(_) | Self::TextNode(_) | Self::Document | Self::Window | Self::Console => {
                "object"
            }
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::Str(s) if s.trim().is_empty() => 0.0,
            Self::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    fn to_js_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".into(),
            Self::Null => "null".into(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Str(s) | Self::TextNode(s) => s.clone(),
            Self::Element(_) => "[object HTMLElement]".into(),
            Self::Document => "[object HTMLDocument]".into(),
            Self::Window => "[object Window]".into(),
            Self::Console => "[object console]".into(),
        }
    }

    fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Undefined | Self::Null | Self::Bool(_) | Self::Number(_) | Self::Str(_)
        )
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Parse and run `source` against `host` with `environment` defined as `true`.
pub fn run_script(source: &str, environment: &str, host: &mut dyn DomHost) -> Result<(), String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if let Some(err) = ret.errors.first() {
        return Err(err.to_string());
    }

    let mut interp = Interpreter {
        source,
        environment,
        host,
        scopes: vec![FxHashMap::default()],
    };
    interp.run_program(&ret.program)
}

struct Interpreter<'s, 'h> {
    source: &'s str,
    environment: &'s str,
    host: &'h mut dyn DomHost,
    scopes: Vec<FxHashMap<String, Value>>,
}

type EvalResult<T> = Result<T, String>;

impl Interpreter<'_, '_> {
    fn run_program(&mut self, program: &Program<'_>) -> EvalResult<()> {
        for stmt in program.body.iter() {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn unsupported(&self, what: &str, span: Span) -> String {
        let snippet = self
            .source
            .get(span.start as usize..span.end as usize)
            .unwrap_or_default();
        let snippet: String = snippet.chars().take(60).collect();
        format!("unsupported {what}: `{snippet}`")
    }

    fn exec(&mut self, stmt: &Statement<'_>) -> EvalResult<()> {
        match stmt {
            Statement::EmptyStatement(_) => Ok(()),
            Statement::ExpressionStatement(s) => self.eval(&s.expression).map(|_| ()),
            Statement::BlockStatement(block) => {
                self.scopes.push(FxHashMap::default());
                let result = block.body.iter().try_for_each(|s| self.exec(s));
                self.scopes.pop();
                result
            }
            Statement::IfStatement(s) => {
                if self.eval(&s.test)?.truthy() {
                    self.exec(&s.consequent)
                } else if let Some(alt) = &s.alternate {
                    self.exec(alt)
                } else {
                    Ok(())
                }
            }
            Statement::VariableDeclaration(decl) => self.declare(decl),
            other => Err(self.unsupported("statement", other.span())),
        }
    }

    fn declare(&mut self, decl: &VariableDeclaration<'_>) -> EvalResult<()> {
        for declarator in decl.declarations.iter() {
            let Some(ident) = declarator.id.get_binding_identifier() else {
                return Err(self.unsupported("binding pattern", declarator.span));
            };
            let value = match &declarator.init {
                Some(init) => self.eval(init)?,
                None => Value::Undefined,
            };
            let name = ident.name.as_str().to_string();
            let scope = match decl.kind {
                VariableDeclarationKind::Var => self.scopes.first_mut(),
                _ => self.scopes.last_mut(),
            };
            if let Some(scope) = scope {
                scope.insert(name, value);
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Value {
        if let Some(value) = self.scopes.iter().rev().find_map(|s| s.get(name)) {
            return value.clone();
        }
        match name {
            "document" => Value::Document,
            "window" | "self" | "globalThis" => Value::Window,
            "console" => Value::Console,
            "NaN" => Value::Number(f64::NAN),
            "Infinity" => Value::Number(f64::INFINITY),
            _ if name == self.environment => Value::Bool(true),
            _ => Value::Undefined,
        }
    }

    fn assign_name(&mut self, name: &str, value: Value) {
        let scope = self
            .scopes
            .iter_mut()
            .rev()
            .find(|s| s.contains_key(name));
        match scope {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => {
                if let Some(global) = self.scopes.first_mut() {
                    global.insert(name.to_string(), value);
                }
            }
        }
    }

    fn eval(&mut self, expr: &Expression<'_>) -> EvalResult<Value> {
        match expr {
            Expression::BooleanLiteral(lit) => Ok(Value::Bool(lit.value)),
            Expression::NullLiteral(_) => Ok(Value::Null),
            Expression::NumericLiteral(lit) => Ok(Value::Number(lit.value)),
            Expression::StringLiteral(lit) => Ok(Value::Str(lit.value.as_str().to_string())),
            Expression::TemplateLiteral(tpl) => self.eval_template(tpl).map(Value::Str),
            Expression::Identifier(ident) => Ok(self.lookup(ident.name.as_str())),
            Expression::ParenthesizedExpression(p) => self.eval(&p.expression),
            Expression::SequenceExpression(seq) => {
                let mut last = Value::Undefined;
                for e in seq.expressions.iter() {
                    last = self.eval(e)?;
                }
                Ok(last)
            }
            Expression::StaticMemberExpression(member) => self.eval_member(member),
            Expression::CallExpression(call) => {
                let Expression::StaticMemberExpression(member) = &call.callee else {
                    return Err(self.unsupported("call", call.span));
                };
                let mut args = Vec::with_capacity(call.arguments.len());
                for arg in call.arguments.iter() {
                    let Some(arg) = arg.as_expression() else {
                        return Err(self.unsupported("argument", call.span));
                    };
                    args.push(self.eval(arg)?);
                }
                let target = self.eval(&member.object)?;
                self.call_method(target, member.property.name.as_str(), args, call.span)
            }
            Expression::AssignmentExpression(assign) => {
                let value = self.eval(&assign.right)?;
                let value = match assign.operator {
                    AssignmentOperator::Assign => value,
                    AssignmentOperator::Addition => {
                        let current = self.read_target(&assign.left, assign.span)?;
                        add(&current, &value)
                    }
                    _ => return Err(self.unsupported("assignment operator", assign.span)),
                };
                self.write_target(&assign.left, value.clone(), assign.span)?;
                Ok(value)
            }
            Expression::BinaryExpression(bin) => {
                let left = self.eval(&bin.left)?;
                let right = self.eval(&bin.right)?;
                self.binary(bin.operator, &left, &right, bin.span)
            }
            Expression::LogicalExpression(logical) => {
                let left = self.eval(&logical.left)?;
                let short_circuit = match logical.operator {
                    LogicalOperator::And => !left.truthy(),
                    LogicalOperator::Or => left.truthy(),
                    LogicalOperator::Coalesce => !matches!(left, Value::Undefined | Value::Null),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(&logical.right)
                }
            }
            Expression::UnaryExpression(unary) => {
                let value = self.eval(&unary.argument)?;
                match unary.operator {
                    UnaryOperator::LogicalNot => Ok(Value::Bool(!value.truthy())),
                    UnaryOperator::Typeof => Ok(Value::Str(value.type_of().to_string())),
                    UnaryOperator::UnaryNegation => Ok(Value::Number(-value.to_number())),
                    UnaryOperator::UnaryPlus => Ok(Value::Number(value.to_number())),
                    UnaryOperator::Void => Ok(Value::Undefined),
                    _ => Err(self.unsupported("unary operator", unary.span)),
                }
            }
            Expression::ConditionalExpression(cond) => {
                if self.eval(&cond.test)?.truthy() {
                    self.eval(&cond.consequent)
                } else {
                    self.eval(&cond.alternate)
                }
            }
            other => Err(self.unsupported("expression", other.span())),
        }
    }

    fn eval_template(&mut self, tpl: &TemplateLiteral<'_>) -> EvalResult<String> {
        let mut out = String::new();
        for (i, quasi) in tpl.quasis.iter().enumerate() {
            match &quasi.value.cooked {
                Some(cooked) => out.push_str(cooked.as_str()),
                None => out.push_str(quasi.value.raw.as_str()),
            }
            if let Some(expr) = tpl.expressions.get(i) {
                out.push_str(&self.eval(expr)?.to_js_string());
            }
        }
        Ok(out)
    }

    fn eval_member(&mut self, member: &StaticMemberExpression<'_>) -> EvalResult<Value> {
        let object = self.eval(&member.object)?;
        let prop = member.property.name.as_str();
        Ok(match (&object, prop) {
            (Value::Document, "body") => self.host.body().map_or(Value::Null, Value::Element),
            (Value::Document, "head") => self.host.head().map_or(Value::Null, Value::Element),
            (Value::Window, "document") => Value::Document,
            (Value::Window, name) => self.lookup(name),
            (Value::Str(s), "length") => Value::Number(s.chars().count() as f64),
            (Value::Element(node), "textContent" | "innerText") => {
                self.host.text(*node).map_or(Value::Null, Value::Str)
            }
            (Value::Element(node), "id") => Value::Str(self.host.get_attribute(*node, "id").unwrap_or_default()),
            (Value::Element(node), "className") => {
                Value::Str(self.host.get_attribute(*node, "class").unwrap_or_default())
            }
            (Value::Undefined | Value::Null, _) => {
                return Err(format!(
                    "cannot read property `{prop}` of {}",
                    object.to_js_string()
                ));
            }
            _ => Value::Undefined,
        })
    }

    fn call_method(&mut self, target: Value, method: &str, args: Vec<Value>, span: Span) -> EvalResult<Value> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);

        match (&target, method) {
            (Value::Document, "write" | "writeln") => {
                let mut html: String = args.iter().map(Value::to_js_string).collect();
                if method == "writeln" {
                    html.push('\n');
                }
                self.host.write(&html);
                Ok(Value::Undefined)
            }
            (Value::Document, "createElement") => {
                let tag = arg(0).to_js_string();
                Ok(Value::Element(self.host.create_element(&tag)))
            }
            (Value::Document, "createTextNode") => Ok(Value::TextNode(arg(0).to_js_string())),
            (Value::Document, "getElementById") => {
                let id = arg(0).to_js_string();
                Ok(self.host.element_by_id(&id).map_or(Value::Null, Value::Element))
            }
            (Value::Element(parent), "appendChild") => {
                let child = match arg(0) {
                    Value::Element(node) => Child::Element(node),
                    Value::TextNode(text) => Child::Text(text),
                    other => return Err(format!("appendChild expects a node, got {}", other.type_of())),
                };
                self.host.append_child(*parent, child)?;
                Ok(arg(0))
            }
            (Value::Element(node), "setAttribute") => {
                let name = arg(0).to_js_string();
                let value = arg(1).to_js_string();
                self.host.set_attribute(*node, &name, &value)?;
                Ok(Value::Undefined)
            }
            (Value::Element(node), "getAttribute") => {
                let name = arg(0).to_js_string();
                Ok(self.host.get_attribute(*node, &name).map_or(Value::Null, Value::Str))
            }
            (Value::Console, _) => Ok(Value::Undefined),
            _ => Err(self.unsupported("call", span)),
        }
    }

    fn read_target(&mut self, target: &AssignmentTarget<'_>, span: Span) -> EvalResult<Value> {
        match target {
            AssignmentTarget::AssignmentTargetIdentifier(ident) => Ok(self.lookup(ident.name.as_str())),
            AssignmentTarget::StaticMemberExpression(member) => self.eval_member(member),
            _ => Err(self.unsupported("assignment target", span)),
        }
    }

    fn write_target(&mut self, target: &AssignmentTarget<'_>, value: Value, span: Span) -> EvalResult<()> {
        match target {
            AssignmentTarget::AssignmentTargetIdentifier(ident) => {
                self.assign_name(ident.name.as_str(), value);
                Ok(())
            }
            AssignmentTarget::StaticMemberExpression(member) => {
                let object = self.eval(&member.object)?;
                let prop = member.property.name.as_str();
                match (object, prop) {
                    (Value::Element(node), "textContent" | "innerText") => {
                        self.host.set_text(node, &value.to_js_string())
                    }
                    (Value::Element(node), "innerHTML") => self.host.set_inner_html(node, &value.to_js_string()),
                    (Value::Element(node), "id") => self.host.set_attribute(node, "id", &value.to_js_string()),
                    (Value::Element(node), "className") => {
                        self.host.set_attribute(node, "class", &value.to_js_string())
                    }
                    (Value::Window, name) => {
                        self.assign_name(name, value);
                        Ok(())
                    }
                    _ => Err(self.unsupported("assignment target", span)),
                }
            }
            _ => Err(self.unsupported("assignment target", span)),
        }
    }

    fn binary(&self, op: BinaryOperator, left: &Value, right: &Value, span: Span) -> EvalResult<Value> {
        let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
        let cmp = |f: fn(f64, f64) -> bool| Value::Bool(compare(left, right, f));

        Ok(match op {
            BinaryOperator::Addition => add(left, right),
            BinaryOperator::Subtraction => num(|a, b| a - b),
            BinaryOperator::Multiplication => num(|a, b| a * b),
            BinaryOperator::Division => num(|a, b| a / b),
            BinaryOperator::Remainder => num(|a, b| a % b),
            BinaryOperator::StrictEquality => Value::Bool(strict_equals(left, right)),
            BinaryOperator::StrictInequality => Value::Bool(!strict_equals(left, right)),
            BinaryOperator::Equality => Value::Bool(loose_equals(left, right)),
            BinaryOperator::Inequality => Value::Bool(!loose_equals(left, right)),
            BinaryOperator::LessThan => cmp(|a, b| a < b),
            BinaryOperator::LessEqualThan => cmp(|a, b| a <= b),
            BinaryOperator::GreaterThan => cmp(|a, b| a > b),
            BinaryOperator::GreaterEqualThan => cmp(|a, b| a >= b),
            _ => return Err(self.unsupported("binary operator", span)),
        })
    }
}

fn add(left: &Value, right: &Value) -> Value {
    let stringy = |v: &Value| matches!(v, Value::Str(_)) || !v.is_primitive();
    if stringy(left) || stringy(right) {
        Value::Str(left.to_js_string() + &right.to_js_string())
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn compare(left: &Value, right: &Value, f: fn(f64, f64) -> bool) -> bool {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => f(
            match a.cmp(b) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            },
            0.0,
        ),
        _ => f(left.to_number(), right.to_number()),
    }
}

fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b,
        _ => left == right,
    }
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (a, b) if a.is_primitive() && b.is_primitive() => match (a, b) {
            (Value::Str(x), Value::Str(y)) => x == y,
            _ => a.to_number() == b.to_number(),
        },
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records host calls instead of touching a document.
    #[derive(Default)]
    struct Recorder {
        written: String,
        next: u32,
        appended: Vec<(NodeId, Child)>,
        attrs: Vec<(NodeId, String, String)>,
    }

    impl DomHost for Recorder {
        fn write(&mut self, html: &str) {
            self.written.push_str(html);
        }
        fn create_element(&mut self, _tag: &str) -> NodeId {
            self.next += 1;
            NodeId(100 + self.next)
        }
        fn append_child(&mut self, parent: NodeId, child: Child) -> Result<(), String> {
            self.appended.push((parent, child));
            Ok(())
        }
        fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), String> {
            self.attrs.push((node, name.into(), value.into()));
            Ok(())
        }
        fn get_attribute(&self, _node: NodeId, _name: &str) -> Option<String> {
            None
        }
        fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), String> {
            self.attrs.push((node, "#text".into(), text.into()));
            Ok(())
        }
        fn set_inner_html(&mut self, node: NodeId, html: &str) -> Result<(), String> {
            self.attrs.push((node, "#html".into(), html.into()));
            Ok(())
        }
        fn text(&self, _node: NodeId) -> Option<String> {
            None
        }
        fn body(&self) -> Option<NodeId> {
            Some(NodeId(1))
        }
        fn head(&self) -> Option<NodeId> {
            None
        }
        fn element_by_id(&self, _id: &str) -> Option<NodeId> {
            None
        }
    }

    fn run(source: &str) -> Recorder {
        let mut host = Recorder::default();
        run_script(source, "theEnvironment", &mut host).unwrap();
        host
    }

    #[test]
    fn test_environment_guard() {
        let host = run("if (theEnvironment) { document.write('<div>Howdy</div>'); }");
        assert_eq!(host.written, "<div>Howdy</div>");

        let host = run("if (otherEnvironment) { document.write('<div>No</div>'); }");
        assert!(host.written.is_empty());

        let host = run("if (window.theEnvironment && !window.debug) document.write('a'); else document.write('b');");
        assert_eq!(host.written, "a");
    }

    #[test]
    fn test_variables_and_templates() {
        let host = run(
            "var name = 'World'; let n = 2 + 1;\n\
             const msg = `Hello ${name} x${n}`;\n\
             document.writeln(msg + '!');",
        );
        assert_eq!(host.written, "Hello World x3!\n");
    }

    #[test]
    fn test_dom_building() {
        let host = run(
            "if (typeof theEnvironment !== 'undefined') {\n\
               var el = document.createElement('div');\n\
               el.className = 'note';\n\
               el.appendChild(document.createTextNode('Howdy'));\n\
               document.body.appendChild(el);\n\
             }",
        );

        assert_eq!(host.attrs, [(NodeId(101), "class".to_string(), "note".to_string())]);
        assert_eq!(host.appended.len(), 2);
        assert_eq!(host.appended[0], (NodeId(101), Child::Text("Howdy".into())));
        assert_eq!(host.appended[1], (NodeId(1), Child::Element(NodeId(101))));
    }

    #[test]
    fn test_unsupported_constructs() {
        let mut host = Recorder::default();
        let err = run_script("for (;;) {}", "theEnvironment", &mut host).unwrap_err();
        assert!(err.starts_with("unsupported statement"));

        let err = run_script("alert('x')", "theEnvironment", &mut host).unwrap_err();
        assert!(err.contains("unsupported call"));

        assert!(run_script("if (", "theEnvironment", &mut host).is_err());
    }

    #[test]
    fn test_equality_rules() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&Value::Str("1".into()), &Value::Number(1.0)));
        assert!(!strict_equals(&Value::Str("1".into()), &Value::Number(1.0)));
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.5), "0.5");
    }
}
