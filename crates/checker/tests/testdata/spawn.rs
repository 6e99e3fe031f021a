//concur:main
fn foo() -> i32 {
    0
}

//concur:bar,main
fn bar(_id: i32) {
    foo();
}

//concur:bar
fn baz() {
    foo();
    bar(0);
}

//concur:!main
fn run(f: fn()) -> i32 {
    f();
    0
}

#[ctor]
fn init() {
    foo();
    baz();
}

fn main() {
    foo();
    bar(0);
    std::thread::spawn(|| foo());
    baz();
    std::thread::spawn(baz);
    run(baz);
}
