//tag:foo
fn want_foo() {}

//tag:foo,baz
fn want_foo_baz() {}

//tag:foo,bar
fn caller() {
    want_foo();
    want_foo_baz();
    let untagged = || {
        want_foo();
    };
    //tag:foo
    let tagged = || {
        want_foo();
    };
    untagged();
    tagged();
}
