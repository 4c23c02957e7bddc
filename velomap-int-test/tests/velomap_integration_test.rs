mod page_tree;

#[ctor::ctor]
fn init() {
    colog::init();
}
