fn main() {
    usbcreator::main()
}
